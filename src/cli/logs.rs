use crate::companion::Companion;
use crate::config::{find_data_path, CompanionConfig};
use crate::logstore::{open_log_store, LogStore};
use crate::types::LogEntry;

fn open_logs() -> Result<Box<dyn LogStore>, String> {
    let data_path =
        find_data_path().ok_or("No .companion directory found. Run 'companion init' first.")?;
    let config = CompanionConfig::load(&data_path).map_err(|e| format!("Failed to load config: {}", e))?;
    open_log_store(&data_path, &config).map_err(|e| format!("Failed to open log store: {}", e))
}

/// Run the logs command
pub fn run_logs(limit: usize) -> Result<(), String> {
    let entries = open_logs()?
        .read_all()
        .map_err(|e| format!("Failed to read logs: {}", e))?;

    if entries.is_empty() {
        println!("No conversations logged yet.");
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        print_entry(entry);
    }

    Ok(())
}

/// Run the export command
pub fn run_export(format: &str) -> Result<(), String> {
    let entries = open_logs()?
        .read_all()
        .map_err(|e| format!("Failed to read logs: {}", e))?;

    print!("{}", render_export(&entries, format)?);
    Ok(())
}

/// Run the checkin command
pub fn run_checkin(mood: &str, intensity: Option<u8>, notes: &str) -> Result<(), String> {
    let companion = Companion::open()?;
    let entry = companion
        .check_in(mood, intensity, notes)
        .map_err(|e| e.to_string())?;

    match entry.intensity {
        Some(i) => println!("Logged mood '{}' ({}/10) at {}", entry.mood, i, entry.timestamp),
        None => println!("Logged mood '{}' at {}", entry.mood, entry.timestamp),
    }
    Ok(())
}

/// Run the stats command
pub fn run_stats() -> Result<(), String> {
    let companion = Companion::open()?;
    let stats = companion
        .analytics()
        .map_err(|e| format!("Failed to read logs: {}", e))?;

    println!("Mood Statistics");
    println!("===============\n");

    let o = &stats.overview;
    println!("Conversations:  {}", o.total_turns);
    println!("With a tip:     {}", o.turns_with_tip);
    println!("Check-ins:      {}", o.check_ins);
    if let Some(score) = o.avg_tip_score {
        println!("Avg tip score:  {:.3}", score);
    }
    if let (Some(first), Some(last)) = (&o.first_activity, &o.last_activity) {
        println!("Active:         {} .. {}", first, last);
    }

    let m = &stats.mood_analytics;
    if let Some(avg) = m.avg_intensity {
        println!("Avg intensity:  {:.2}", avg);
    }
    if !m.by_mood.is_empty() {
        println!("\nMoods:");
        let mut moods: Vec<_> = m.by_mood.iter().collect();
        moods.sort_by(|a, b| b.1.cmp(a.1));
        for (mood, count) in moods.iter().take(10) {
            println!("  {:20} {}", mood, count);
        }
    }

    if !stats.by_tip_topic.is_empty() {
        println!("\nTip topics:");
        for (topic, count) in &stats.by_tip_topic {
            println!("  {:20} {}", topic, count);
        }
    }

    Ok(())
}

fn render_export(entries: &[LogEntry], format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(entries)
            .map(|s| s + "\n")
            .map_err(|e| format!("Failed to serialize: {}", e)),
        "csv" => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for entry in entries {
                writer
                    .serialize(entry)
                    .map_err(|e| format!("Failed to serialize: {}", e))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| format!("Failed to serialize: {}", e))?;
            String::from_utf8(bytes).map_err(|e| format!("Failed to serialize: {}", e))
        }
        "md" => {
            let mut out = String::new();
            for e in entries {
                out.push_str(&format!("## {}", e.timestamp));
                if let Some(mood) = &e.mood {
                    out.push_str(&format!(" ({})", mood));
                }
                out.push_str("\n\n");
                out.push_str(&format!("**You:** {}\n\n", e.user_input));
                out.push_str(&format!("**AI:** {}\n\n", e.ai_reply));
                if let Some(score) = e.tip_score {
                    out.push_str(&format!("*Tip ({}, {:.3}):* {}\n\n", e.tip_topic, score, e.tip_text));
                }
                out.push_str("---\n\n");
            }
            Ok(out)
        }
        _ => Err(format!("Unknown format: {}", format)),
    }
}

fn print_entry(e: &LogEntry) {
    match &e.mood {
        Some(mood) => println!("{}  mood: {}", e.timestamp, mood),
        None => println!("{}", e.timestamp),
    }

    println!("    you: {}", preview(&e.user_input));
    println!("    ai:  {}", preview(&e.ai_reply));
    if let Some(score) = e.tip_score {
        println!("    tip: ({}, {:.3}) {}", e.tip_topic, score, preview(&e.tip_text));
    }
    println!();
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(120).collect();
    let short = if text.chars().count() > 120 {
        format!("{}...", short)
    } else {
        short
    };
    short.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<LogEntry> {
        vec![
            LogEntry {
                timestamp: "2025-07-26T10:00:00".to_string(),
                mood: Some("anxious".to_string()),
                user_input: "Exams tomorrow".to_string(),
                ai_reply: "You've prepared well.".to_string(),
                tip_topic: "anxiety".to_string(),
                tip_text: "Try 4-7-8 breathing".to_string(),
                tip_score: Some(0.82),
            },
            LogEntry {
                timestamp: "2025-07-26T10:05:00".to_string(),
                mood: None,
                user_input: "Thanks".to_string(),
                ai_reply: "Any time.".to_string(),
                tip_topic: String::new(),
                tip_text: String::new(),
                tip_score: None,
            },
        ]
    }

    #[test]
    fn test_export_json() {
        let out = render_export(&sample(), "json").unwrap();
        let parsed: Vec<LogEntry> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_export_md_skips_missing_tip() {
        let out = render_export(&sample(), "md").unwrap();
        assert!(out.contains("## 2025-07-26T10:00:00 (anxious)"));
        assert!(out.contains("*Tip (anxiety, 0.820):* Try 4-7-8 breathing"));
        assert_eq!(out.matches("*Tip").count(), 1);
    }

    #[test]
    fn test_export_csv_has_header() {
        let out = render_export(&sample(), "csv").unwrap();
        assert!(out.starts_with("timestamp,mood,user_input,ai_reply,tip_topic,tip_text,tip_score\n"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_export_unknown_format() {
        assert!(render_export(&sample(), "xml").is_err());
    }

    #[test]
    fn test_preview_truncates() {
        let long = "a".repeat(200);
        assert_eq!(preview(&long).len(), 123);
        assert_eq!(preview("one\ntwo"), "one two");
    }
}
