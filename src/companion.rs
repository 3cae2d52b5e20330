use crate::config::{find_data_path, tips_db, CompanionConfig, DATA_DIR_NAME, DEFAULT_PREAMBLE};
use crate::corpus::{TipCorpus, TipStore};
use crate::embeddings::{get_embedder, Embedder};
use crate::error::{EmbeddingError, LogError};
use crate::generation::{build_prompt, CompletionClient, Generator};
use crate::logstore::{open_log_store, LogStore};
use crate::matcher::{LinearMatcher, TipMatcher};
use crate::types::{Analytics, LogEntry, MatchedTip, MoodAnalytics, MoodEntry, Overview};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one conversation turn
#[derive(Debug)]
pub struct TurnOutcome {
    /// Reply plus the formatted tip, ready to show the user
    pub output: String,
    pub reply: String,
    /// The reply is a backend error notice rather than generated text
    pub degraded: bool,
    pub tip: Option<MatchedTip>,
    pub entry: LogEntry,
    /// Set when the log entry could not be stored
    pub log_warning: Option<LogError>,
}

/// The conversation orchestrator
pub struct Companion {
    generator: Box<dyn Generator>,
    embedder: Box<dyn Embedder>,
    matcher: Box<dyn TipMatcher>,
    corpus: Arc<TipCorpus>,
    log: Box<dyn LogStore>,
    preamble: String,
    data_path: Option<PathBuf>,
}

impl Companion {
    pub fn new(
        generator: Box<dyn Generator>,
        embedder: Box<dyn Embedder>,
        corpus: Arc<TipCorpus>,
        log: Box<dyn LogStore>,
    ) -> Self {
        Self {
            generator,
            embedder,
            matcher: Box::new(LinearMatcher),
            corpus,
            log,
            preamble: DEFAULT_PREAMBLE.to_string(),
            data_path: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Open the companion for the nearest data directory
    pub fn open() -> Result<Self, String> {
        let data_path = find_data_path()
            .ok_or("No .companion directory found. Run 'companion init' first.")?;
        Self::open_at(data_path)
    }

    /// Open the companion for a specific data directory
    pub fn open_at(data_path: PathBuf) -> Result<Self, String> {
        if !data_path.exists() {
            return Err(format!("Path does not exist: {}", data_path.display()));
        }

        let config = CompanionConfig::load(&data_path)
            .map_err(|e| format!("Failed to load config: {}", e))?;

        let generator = CompletionClient::from_config(&config)
            .map_err(|e| format!("Failed to create generation client: {}", e))?;
        let embedder =
            get_embedder(&config).map_err(|e| format!("Failed to create embedder: {}", e))?;
        let log = open_log_store(&data_path, &config)
            .map_err(|e| format!("Failed to open log store: {}", e))?;

        // Reported once here; turns then simply run without tips
        let corpus = match TipStore::open(&tips_db(&data_path)).and_then(|s| s.load_all()) {
            Ok(corpus) => {
                info!("Loaded {} tips", corpus.len());
                corpus
            }
            Err(e) => {
                warn!("{}; continuing without tips", e);
                TipCorpus::empty()
            }
        };

        let mut companion = Self::new(Box::new(generator), embedder, Arc::new(corpus), log)
            .with_preamble(config.preamble.clone());
        companion.data_path = Some(data_path);
        Ok(companion)
    }

    /// Create a data directory with default config and an empty tip store
    pub fn init(path: &Path) -> Result<PathBuf, String> {
        let data_path = path.join(DATA_DIR_NAME);
        fs::create_dir_all(&data_path)
            .map_err(|e| format!("Failed to create {} directory: {}", DATA_DIR_NAME, e))?;

        CompanionConfig::default()
            .save(&data_path)
            .map_err(|e| format!("Failed to write config: {}", e))?;
        TipStore::open(&tips_db(&data_path)).map_err(|e| format!("Failed to create tip store: {}", e))?;

        Ok(data_path)
    }

    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    pub fn corpus(&self) -> &TipCorpus {
        &self.corpus
    }

    pub fn log(&self) -> &dyn LogStore {
        self.log.as_ref()
    }

    // =========================================================================
    // Turn pipeline
    // =========================================================================

    /// Handle one user message; empty input is a no-op
    pub fn turn(&self, user_input: &str, mood: Option<&str>) -> Option<TurnOutcome> {
        let user_input = user_input.trim();
        if user_input.is_empty() {
            return None;
        }

        let (reply, degraded) = self.generate(user_input);
        let tip = self.match_tip(user_input);
        let output = compose(&reply, tip.as_ref());

        let entry = LogEntry::now(user_input, &reply, mood, tip.as_ref());
        let log_warning = match self.log.append(&entry) {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to log turn: {}", e);
                Some(e)
            }
        };

        Some(TurnOutcome {
            output,
            reply,
            degraded,
            tip,
            entry,
            log_warning,
        })
    }

    fn generate(&self, user_input: &str) -> (String, bool) {
        let prompt = build_prompt(&self.preamble, user_input);
        match self.generator.complete(&prompt) {
            Ok(reply) => (reply, false),
            Err(e) => {
                warn!("Generation backend failed: {}", e);
                (format!("(generation backend error: {})", e), true)
            }
        }
    }

    fn match_tip(&self, user_input: &str) -> Option<MatchedTip> {
        if self.corpus.is_empty() {
            return None;
        }

        let query = match self.embed_query(user_input) {
            Ok(query) => query,
            Err(e) => {
                warn!("No tip for this turn: {}", e);
                return None;
            }
        };

        let best = self.matcher.best_match(&query, self.corpus.records())?;
        debug!("Best tip '{}' scored {:.3}", best.tip.topic, best.score);
        Some(best.to_matched())
    }

    fn embed_query(&self, user_input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let query = self.embedder.embed(user_input)?;
        match self.corpus.dimension() {
            Some(expected) if expected != query.len() => Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: query.len(),
            }),
            _ => Ok(query),
        }
    }
}

impl Companion {
    // =========================================================================
    // Mood check-ins and analytics
    // =========================================================================

    /// Record a mood check-in; intensity, when given, must be 1 to 10
    pub fn check_in(&self, mood: &str, intensity: Option<u8>, notes: &str) -> Result<MoodEntry, LogError> {
        if mood.trim().is_empty() {
            return Err(LogError::InvalidCheckIn("mood is required".to_string()));
        }
        if let Some(i) = intensity.filter(|i| !(1..=10).contains(i)) {
            return Err(LogError::InvalidCheckIn(format!(
                "intensity {} is outside 1-10",
                i
            )));
        }

        let entry = MoodEntry::now(mood, intensity, notes);
        self.log.append_mood(&entry)?;
        debug!("Recorded check-in '{}'", entry.mood);
        Ok(entry)
    }

    /// Statistics over every logged turn and check-in
    pub fn analytics(&self) -> Result<Analytics, LogError> {
        let turns = self.log.read_all()?;
        let check_ins = self.log.read_moods()?;
        Ok(summarize(&turns, &check_ins))
    }
}

/// Aggregate turns and check-ins into analytics
pub fn summarize(turns: &[LogEntry], check_ins: &[MoodEntry]) -> Analytics {
    let mut by_mood: BTreeMap<String, usize> = BTreeMap::new();
    let moods = turns
        .iter()
        .filter_map(|t| t.mood.as_deref())
        .chain(check_ins.iter().map(|c| c.mood.as_str()));
    for mood in moods {
        let mood = mood.trim().to_lowercase();
        if !mood.is_empty() {
            *by_mood.entry(mood).or_insert(0) += 1;
        }
    }

    // Ties go to the alphabetically first mood
    let mut most_common: Option<(&String, usize)> = None;
    for (mood, &count) in &by_mood {
        if most_common.map_or(true, |(_, best)| count > best) {
            most_common = Some((mood, count));
        }
    }
    let most_common = most_common.map(|(m, _)| m.clone());

    let mut by_tip_topic: BTreeMap<String, usize> = BTreeMap::new();
    let scores: Vec<f64> = turns.iter().filter_map(|t| t.tip_score).collect();
    for turn in turns.iter().filter(|t| t.tip_score.is_some()) {
        *by_tip_topic.entry(turn.tip_topic.clone()).or_insert(0) += 1;
    }

    let intensities: Vec<f64> = check_ins
        .iter()
        .filter_map(|c| c.intensity)
        .map(f64::from)
        .collect();

    let timestamps = turns
        .iter()
        .map(|t| &t.timestamp)
        .chain(check_ins.iter().map(|c| &c.timestamp));

    Analytics {
        overview: Overview {
            total_turns: turns.len(),
            turns_with_tip: scores.len(),
            check_ins: check_ins.len(),
            avg_tip_score: mean(&scores).map(crate::types::round_score),
            first_activity: timestamps.clone().min().cloned(),
            last_activity: timestamps.max().cloned(),
        },
        mood_analytics: MoodAnalytics {
            by_mood,
            most_common,
            avg_intensity: mean(&intensities).map(|m| (m * 100.0).round() / 100.0),
        },
        by_tip_topic,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Reply text followed by the tip line, if any
pub fn compose(reply: &str, tip: Option<&MatchedTip>) -> String {
    match tip {
        Some(t) => format!("{}\n\ntip ({}, {:.2}): {}", reply, t.topic, t.score, t.tip_text),
        None => reply.to_string(),
    }
}
