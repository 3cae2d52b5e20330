use crate::config::{log_path, CompanionConfig, LogFormat};
use crate::error::LogError;
use crate::types::{LogEntry, MoodEntry};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File name of the CSV check-in log, kept next to the turn log
pub const CHECKIN_FILE: &str = "mood_checkins.csv";

/// Append-only sink for per-turn log entries and mood check-ins
pub trait LogStore: Send + Sync {
    /// Write one entry, creating the header or schema on first use
    fn append(&self, entry: &LogEntry) -> Result<(), LogError>;

    /// Every entry in append order; a sink never written to is empty
    fn read_all(&self) -> Result<Vec<LogEntry>, LogError>;

    fn append_mood(&self, entry: &MoodEntry) -> Result<(), LogError>;

    fn read_moods(&self) -> Result<Vec<MoodEntry>, LogError>;
}

/// Open the log store selected by the config
pub fn open_log_store(data_path: &Path, config: &CompanionConfig) -> Result<Box<dyn LogStore>, LogError> {
    let path = log_path(data_path, config);
    match config.log_format {
        LogFormat::Csv => Ok(Box::new(CsvLogStore::new(path))),
        LogFormat::Sqlite => Ok(Box::new(SqliteLogStore::open(&path)?)),
    }
}

// =============================================================================
// CsvLogStore
// =============================================================================

/// CSV files with a header row, one line per entry
pub struct CsvLogStore {
    path: PathBuf,
    mood_path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLogStore {
    pub fn new(path: PathBuf) -> Self {
        let mood_path = path.with_file_name(CHECKIN_FILE);
        Self {
            path,
            mood_path,
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the row (and the header, if needed) as one buffer
    fn encode<T: Serialize>(row: &T, with_header: bool) -> Result<Vec<u8>, LogError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .from_writer(Vec::new());
        writer.serialize(row)?;
        writer.into_inner().map_err(|e| LogError::Io(e.into_error()))
    }

    fn append_row<T: Serialize>(&self, path: &Path, row: &T) -> Result<(), LogError> {
        let _guard = self.write_lock.lock().map_err(|_| LogError::Poisoned)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let with_header = file.metadata()?.len() == 0;
        let bytes = Self::encode(row, with_header)?;

        // A single write on an O_APPEND handle keeps the row whole for readers
        file.write_all(&bytes)?;
        file.flush()?;

        debug!("Appended row to {}", path.display());
        Ok(())
    }

    fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LogError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            rows.push(record?);
        }
        Ok(rows)
    }
}

impl LogStore for CsvLogStore {
    fn append(&self, entry: &LogEntry) -> Result<(), LogError> {
        self.append_row(&self.path, entry)
    }

    fn read_all(&self) -> Result<Vec<LogEntry>, LogError> {
        Self::read_rows(&self.path)
    }

    fn append_mood(&self, entry: &MoodEntry) -> Result<(), LogError> {
        self.append_row(&self.mood_path, entry)
    }

    fn read_moods(&self) -> Result<Vec<MoodEntry>, LogError> {
        Self::read_rows(&self.mood_path)
    }
}

// =============================================================================
// SqliteLogStore
// =============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mood_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    mood TEXT,
    user_input TEXT NOT NULL,
    ai_reply TEXT NOT NULL,
    tip_topic TEXT NOT NULL DEFAULT '',
    tip_text TEXT NOT NULL DEFAULT '',
    tip_score REAL
);

CREATE TABLE IF NOT EXISTS mood_checkins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    mood TEXT NOT NULL,
    intensity INTEGER,
    notes TEXT NOT NULL DEFAULT ''
);
"#;

/// Mood log kept in SQLite tables
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    pub fn open(db_path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, LogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LogStore for SqliteLogStore {
    fn append(&self, entry: &LogEntry) -> Result<(), LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        conn.execute(
            "INSERT INTO mood_logs (timestamp, mood, user_input, ai_reply, tip_topic, tip_text, tip_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.timestamp,
                entry.mood,
                entry.user_input,
                entry.ai_reply,
                entry.tip_topic,
                entry.tip_text,
                entry.tip_score,
            ],
        )?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LogEntry>, LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, mood, user_input, ai_reply, tip_topic, tip_text, tip_score
             FROM mood_logs ORDER BY id",
        )?;

        let mut entries = Vec::new();
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            entries.push(LogEntry {
                timestamp: row.get(0)?,
                mood: row.get(1)?,
                user_input: row.get(2)?,
                ai_reply: row.get(3)?,
                tip_topic: row.get(4)?,
                tip_text: row.get(5)?,
                tip_score: row.get(6)?,
            });
        }

        Ok(entries)
    }

    fn append_mood(&self, entry: &MoodEntry) -> Result<(), LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        conn.execute(
            "INSERT INTO mood_checkins (timestamp, mood, intensity, notes) VALUES (?1, ?2, ?3, ?4)",
            params![entry.timestamp, entry.mood, entry.intensity, entry.notes],
        )?;
        Ok(())
    }

    fn read_moods(&self) -> Result<Vec<MoodEntry>, LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT timestamp, mood, intensity, notes FROM mood_checkins ORDER BY id")?;

        let mut entries = Vec::new();
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            entries.push(MoodEntry {
                timestamp: row.get(0)?,
                mood: row.get(1)?,
                intensity: row.get(2)?,
                notes: row.get(3)?,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entry(n: usize, score: Option<f64>) -> LogEntry {
        LogEntry {
            timestamp: format!("2025-07-26T10:00:{:02}", n % 60),
            mood: if n % 2 == 0 { Some("calm".to_string()) } else { None },
            user_input: format!("message, with \"quotes\" {}", n),
            ai_reply: format!("reply\nline two {}", n),
            tip_topic: if score.is_some() { "anxiety".to_string() } else { String::new() },
            tip_text: if score.is_some() { "Try 4-7-8 breathing".to_string() } else { String::new() },
            tip_score: score,
        }
    }

    fn check_in(mood: &str, intensity: Option<u8>) -> MoodEntry {
        MoodEntry {
            timestamp: "2025-07-26T09:00:00".to_string(),
            mood: mood.to_string(),
            intensity,
            notes: "slept badly, big day".to_string(),
        }
    }

    #[test]
    fn test_csv_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLogStore::new(dir.path().join("mood_logs.csv"));
        assert!(store.read_all().unwrap().is_empty());
        assert!(store.read_moods().unwrap().is_empty());
    }

    #[test]
    fn test_csv_first_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLogStore::new(dir.path().join("mood_logs.csv"));

        store.append(&entry(1, Some(0.82))).unwrap();
        store.append(&entry(2, None)).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let header = "timestamp,mood,user_input,ai_reply,tip_topic,tip_text,tip_score";
        assert!(content.starts_with(header));
        assert_eq!(content.matches(header).count(), 1);
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLogStore::new(dir.path().join("logs").join("mood_logs.csv"));

        let written: Vec<LogEntry> = (0..5)
            .map(|n| entry(n, if n == 3 { None } else { Some(n as f64 / 10.0) }))
            .collect();
        for e in &written {
            store.append(e).unwrap();
        }

        assert_eq!(store.read_all().unwrap(), written);
    }

    #[test]
    fn test_csv_zero_score_distinct_from_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLogStore::new(dir.path().join("mood_logs.csv"));

        store.append(&entry(0, Some(0.0))).unwrap();
        store.append(&entry(1, None)).unwrap();

        let entries = store.read_all().unwrap();
        assert_eq!(entries[0].tip_score, Some(0.0));
        assert_eq!(entries[1].tip_score, None);
    }

    #[test]
    fn test_csv_concurrent_appends_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvLogStore::new(dir.path().join("mood_logs.csv")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10 {
                        store.append(&entry(t * 10 + i, Some(0.5))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 80);
        assert!(entries.iter().all(|e| e.tip_text == "Try 4-7-8 breathing"));
    }

    #[test]
    fn test_csv_check_ins_use_separate_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLogStore::new(dir.path().join("mood_logs.csv"));

        store.append(&entry(1, None)).unwrap();
        store.append_mood(&check_in("happy", Some(8))).unwrap();
        store.append_mood(&check_in("tired", None)).unwrap();

        assert_eq!(store.read_all().unwrap().len(), 1);
        assert_eq!(
            store.read_moods().unwrap(),
            vec![check_in("happy", Some(8)), check_in("tired", None)]
        );
        assert!(dir.path().join(CHECKIN_FILE).exists());
    }

    #[test]
    fn test_sqlite_round_trip() {
        let store = SqliteLogStore::in_memory().unwrap();
        assert!(store.read_all().unwrap().is_empty());

        let written = vec![entry(0, Some(0.25)), entry(1, None), entry(2, Some(0.0))];
        for e in &written {
            store.append(e).unwrap();
        }

        assert_eq!(store.read_all().unwrap(), written);
    }

    #[test]
    fn test_sqlite_check_ins() {
        let store = SqliteLogStore::in_memory().unwrap();
        store.append_mood(&check_in("anxious", Some(6))).unwrap();
        store.append_mood(&check_in("calm", None)).unwrap();

        assert_eq!(
            store.read_moods().unwrap(),
            vec![check_in("anxious", Some(6)), check_in("calm", None)]
        );
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_log_store_by_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CompanionConfig::default();
        config.log_format = LogFormat::Sqlite;

        let store = open_log_store(dir.path(), &config).unwrap();
        store.append(&entry(1, None)).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
        assert!(dir.path().join("mood_logs.db").exists());
    }
}
