use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A curated coping tip with its precomputed embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TipRecord {
    pub topic: String,
    pub tip_text: String,
    pub embedding: Vec<f32>,
}

/// Tip chosen for a turn, detached from the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedTip {
    pub topic: String,
    pub tip_text: String,
    pub score: f64,
}

/// One row of the mood log, written once per turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub mood: Option<String>,
    pub user_input: String,
    pub ai_reply: String,
    pub tip_topic: String,
    pub tip_text: String,
    /// `None` when no tip was found, as opposed to a real zero similarity
    pub tip_score: Option<f64>,
}

impl LogEntry {
    /// Build an entry stamped with the current local time
    pub fn now(user_input: &str, ai_reply: &str, mood: Option<&str>, tip: Option<&MatchedTip>) -> Self {
        Self {
            timestamp: timestamp_now(),
            mood: mood.map(str::trim).filter(|m| !m.is_empty()).map(String::from),
            user_input: user_input.to_string(),
            ai_reply: ai_reply.to_string(),
            tip_topic: tip.map(|t| t.topic.clone()).unwrap_or_default(),
            tip_text: tip.map(|t| t.tip_text.clone()).unwrap_or_default(),
            tip_score: tip.map(|t| round_score(t.score)),
        }
    }
}

/// A standalone mood check-in, outside any conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub timestamp: String,
    pub mood: String,
    /// 1 (barely) to 10 (overwhelming)
    pub intensity: Option<u8>,
    pub notes: String,
}

impl MoodEntry {
    pub fn now(mood: &str, intensity: Option<u8>, notes: &str) -> Self {
        Self {
            timestamp: timestamp_now(),
            mood: mood.trim().to_lowercase(),
            intensity,
            notes: notes.trim().to_string(),
        }
    }
}

/// Totals over the mood log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_turns: usize,
    pub turns_with_tip: usize,
    pub check_ins: usize,
    pub avg_tip_score: Option<f64>,
    pub first_activity: Option<String>,
    pub last_activity: Option<String>,
}

/// Mood counts from turns and check-ins combined
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoodAnalytics {
    pub by_mood: BTreeMap<String, usize>,
    pub most_common: Option<String>,
    pub avg_intensity: Option<f64>,
}

/// Statistics about the logged conversations and check-ins
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analytics {
    pub overview: Overview,
    pub mood_analytics: MoodAnalytics,
    pub by_tip_topic: BTreeMap<String, usize>,
}

fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Round a similarity to the 3 decimals kept in the log
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
