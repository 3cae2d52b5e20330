use crate::error::CorpusError;
use crate::types::TipRecord;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mental_health_tips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    tip_text TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS corpus_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Tips loaded into memory, in insertion order
#[derive(Debug, Clone, Default)]
pub struct TipCorpus {
    dimension: Option<usize>,
    records: Vec<TipRecord>,
}

impl TipCorpus {
    /// Build a corpus from records that already share one dimension
    #[cfg(test)]
    pub fn new(records: Vec<TipRecord>) -> Result<Self, CorpusError> {
        let dimension = records.first().map(|r| r.embedding.len());
        if let Some(dim) = dimension {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != dim) {
                return Err(CorpusError::Invalid(format!(
                    "tip '{}' has {} dimensions, expected {}",
                    bad.topic,
                    bad.embedding.len(),
                    dim
                )));
            }
        }
        Ok(Self { dimension, records })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TipRecord] {
        &self.records
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Tip corpus backed by SQLite
pub struct TipStore {
    conn: Connection,
}

impl TipStore {
    /// Open or create the tip database
    pub fn open(db_path: &Path) -> Result<Self, CorpusError> {
        let conn =
            Connection::open(db_path).map_err(|e| CorpusError::Unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CorpusError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, CorpusError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // -------------------------------------------------------------------------
    // Embedding serialization
    // -------------------------------------------------------------------------

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(data: &[u8]) -> Option<Vec<f32>> {
        if data.is_empty() || data.len() % 4 != 0 {
            return None;
        }
        Some(
            data.chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // Dimension
    // -------------------------------------------------------------------------

    /// Dimension fixed for this corpus, if any tip was ever stored
    pub fn dimension(&self) -> Result<Option<usize>, CorpusError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM corpus_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| CorpusError::Invalid(format!("bad stored dimension: {}", v))),
            None => Ok(None),
        }
    }

    fn set_dimension(&self, dim: usize) -> Result<(), CorpusError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO corpus_meta (key, value) VALUES ('dimension', ?1)",
            params![dim.to_string()],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tip operations
    // -------------------------------------------------------------------------

    /// Add a tip, returns the ID
    pub fn add(&self, topic: &str, tip_text: &str, embedding: &[f32]) -> Result<i64, CorpusError> {
        if topic.trim().is_empty() || tip_text.trim().is_empty() {
            return Err(CorpusError::Invalid("topic and tip text are required".to_string()));
        }
        if embedding.is_empty() {
            return Err(CorpusError::Invalid("embedding is empty".to_string()));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(CorpusError::Invalid("embedding has non-finite values".to_string()));
        }

        match self.dimension()? {
            Some(dim) if dim != embedding.len() => {
                return Err(CorpusError::Invalid(format!(
                    "embedding has {} dimensions, corpus uses {}",
                    embedding.len(),
                    dim
                )));
            }
            Some(_) => {}
            None => self.set_dimension(embedding.len())?,
        }

        self.conn.execute(
            "INSERT INTO mental_health_tips (topic, tip_text, embedding) VALUES (?1, ?2, ?3)",
            params![topic.trim(), tip_text.trim(), Self::serialize_embedding(embedding)],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Load every tip, skipping corrupt rows
    pub fn load_all(&self) -> Result<TipCorpus, CorpusError> {
        let unavailable = |e: rusqlite::Error| CorpusError::Unavailable(e.to_string());

        let mut dimension = self.dimension()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, topic, tip_text, embedding FROM mental_health_tips ORDER BY id")
            .map_err(unavailable)?;

        let mut records = Vec::new();
        let mut rows = stmt.query([]).map_err(unavailable)?;

        while let Some(row) = rows.next().map_err(unavailable)? {
            match Self::decode_row(row, dimension) {
                Ok(record) => {
                    dimension.get_or_insert(record.embedding.len());
                    records.push(record);
                }
                Err(e) => warn!("Skipping tip: {}", e),
            }
        }

        debug!("Loaded {} tips (dimension {:?})", records.len(), dimension);

        Ok(TipCorpus { dimension, records })
    }

    /// Decode one row; a wrongly typed column only spoils that row
    fn decode_row(row: &Row<'_>, dimension: Option<usize>) -> Result<TipRecord, CorpusError> {
        let id: i64 = row.get(0)?;
        let corrupt = |e: rusqlite::Error| CorpusError::CorruptRecord {
            id,
            reason: e.to_string(),
        };

        let topic: String = row.get(1).map_err(corrupt)?;
        let tip_text: String = row.get(2).map_err(corrupt)?;
        let bytes: Vec<u8> = row.get(3).map_err(corrupt)?;
        let embedding = Self::decode_record(id, &bytes, dimension)?;

        Ok(TipRecord {
            topic,
            tip_text,
            embedding,
        })
    }

    fn decode_record(id: i64, bytes: &[u8], dimension: Option<usize>) -> Result<Vec<f32>, CorpusError> {
        let embedding = Self::deserialize_embedding(bytes).ok_or_else(|| CorpusError::CorruptRecord {
            id,
            reason: format!("embedding blob of {} bytes is not a float vector", bytes.len()),
        })?;

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(CorpusError::CorruptRecord {
                id,
                reason: "embedding has non-finite values".to_string(),
            });
        }

        match dimension {
            Some(dim) if dim != embedding.len() => Err(CorpusError::CorruptRecord {
                id,
                reason: format!("expected {} dimensions, found {}", dim, embedding.len()),
            }),
            _ => Ok(embedding),
        }
    }

    /// List tips as (id, topic, tip_text)
    pub fn list(&self) -> Result<Vec<(i64, String, String)>, CorpusError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, topic, tip_text FROM mental_health_tips ORDER BY id")?;

        let mut results = Vec::new();
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            results.push((row.get(0)?, row.get(1)?, row.get(2)?));
        }

        Ok(results)
    }

    /// Get count of tips
    pub fn count(&self) -> Result<usize, CorpusError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM mental_health_tips", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_load_in_order() {
        let store = TipStore::in_memory().unwrap();

        store.add("anxiety", "Try 4-7-8 breathing", &[1.0, 0.0, 0.0]).unwrap();
        store.add("sleep", "Wind down screens 1h before bed", &[0.0, 1.0, 0.0]).unwrap();

        let corpus = store.load_all().unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), Some(3));
        assert_eq!(corpus.records()[0].topic, "anxiety");
        assert_eq!(corpus.records()[1].tip_text, "Wind down screens 1h before bed");
        assert_eq!(corpus.records()[1].embedding, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_empty_store_loads_empty_corpus() {
        let store = TipStore::in_memory().unwrap();
        let corpus = store.load_all().unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.dimension(), None);
    }

    #[test]
    fn test_add_rejects_dimension_mismatch() {
        let store = TipStore::in_memory().unwrap();
        store.add("anxiety", "Breathe", &[1.0, 0.0]).unwrap();

        let result = store.add("sleep", "Rest", &[1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(CorpusError::Invalid(_))));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_corrupt_records_are_skipped() {
        let store = TipStore::in_memory().unwrap();
        store.add("anxiety", "Breathe", &[1.0, 0.0]).unwrap();

        // Wrong dimension and a torn blob, written behind the store's back
        store
            .conn
            .execute(
                "INSERT INTO mental_health_tips (topic, tip_text, embedding) VALUES (?1, ?2, ?3)",
                params!["sleep", "Rest", TipStore::serialize_embedding(&[1.0, 0.0, 0.0])],
            )
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO mental_health_tips (topic, tip_text, embedding) VALUES (?1, ?2, ?3)",
                params!["focus", "Pomodoro", vec![1u8, 2, 3]],
            )
            .unwrap();
        store.add("stress", "Walk outside", &[0.0, 1.0]).unwrap();

        let corpus = store.load_all().unwrap();
        let topics: Vec<&str> = corpus.records().iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(topics, vec!["anxiety", "stress"]);
    }

    #[test]
    fn test_wrongly_typed_row_is_skipped() {
        let store = TipStore::in_memory().unwrap();
        store.add("anxiety", "Breathe", &[1.0, 0.0]).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO mental_health_tips (topic, tip_text, embedding) VALUES (?1, ?2, ?3)",
                params!["sleep", "Rest", "not a blob"],
            )
            .unwrap();
        store.add("stress", "Walk outside", &[0.0, 1.0]).unwrap();

        let corpus = store.load_all().unwrap();
        let topics: Vec<&str> = corpus.records().iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(topics, vec!["anxiety", "stress"]);
    }

    #[test]
    fn test_non_finite_embeddings_rejected() {
        let store = TipStore::in_memory().unwrap();
        let result = store.add("broken", "Nothing", &[f32::NAN, 0.0]);
        assert!(matches!(result, Err(CorpusError::Invalid(_))));

        store.add("anxiety", "Breathe", &[1.0, 0.0]).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO mental_health_tips (topic, tip_text, embedding) VALUES (?1, ?2, ?3)",
                params![
                    "broken",
                    "Nothing",
                    TipStore::serialize_embedding(&[f32::INFINITY, 0.0])
                ],
            )
            .unwrap();

        let corpus = store.load_all().unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.records()[0].topic, "anxiety");

        let err = TipStore::decode_record(3, &TipStore::serialize_embedding(&[f32::NAN]), None).unwrap_err();
        assert!(matches!(err, CorpusError::CorruptRecord { id: 3, .. }));
    }

    #[test]
    fn test_decode_record_reports_corruption() {
        let err = TipStore::decode_record(7, &[0u8; 6], None).unwrap_err();
        assert!(matches!(err, CorpusError::CorruptRecord { id: 7, .. }));

        let err = TipStore::decode_record(8, &TipStore::serialize_embedding(&[1.0]), Some(2)).unwrap_err();
        assert!(matches!(err, CorpusError::CorruptRecord { id: 8, .. }));
    }

    #[test]
    fn test_open_unreachable_path() {
        let result = TipStore::open(Path::new("/nonexistent-dir/deeper/tips.db"));
        assert!(matches!(result, Err(CorpusError::Unavailable(_))));
    }

    #[test]
    fn test_corpus_new_rejects_mixed_dimensions() {
        let records = vec![
            TipRecord {
                topic: "a".to_string(),
                tip_text: "x".to_string(),
                embedding: vec![1.0],
            },
            TipRecord {
                topic: "b".to_string(),
                tip_text: "y".to_string(),
                embedding: vec![1.0, 2.0],
            },
        ];
        assert!(TipCorpus::new(records).is_err());
    }

    #[test]
    fn test_list_tips() {
        let store = TipStore::in_memory().unwrap();
        store.add("anxiety", "Breathe", &[1.0]).unwrap();
        let tips = store.list().unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].1, "anxiety");
    }
}
