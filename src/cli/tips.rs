use crate::config::{find_data_path, tips_db, CompanionConfig};
use crate::corpus::TipStore;
use crate::embeddings::{get_embedder, Embedder};
use crate::matcher::rank;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// A tip as written in an import file
#[derive(Debug, Deserialize)]
struct TipSource {
    topic: String,
    #[serde(alias = "tip_text")]
    tip: String,
}

struct TipsContext {
    store: TipStore,
    embedder: Box<dyn Embedder>,
}

fn open_tips() -> Result<TipsContext, String> {
    let data_path: PathBuf =
        find_data_path().ok_or("No .companion directory found. Run 'companion init' first.")?;
    let config = CompanionConfig::load(&data_path).map_err(|e| format!("Failed to load config: {}", e))?;

    let store = TipStore::open(&tips_db(&data_path)).map_err(|e| e.to_string())?;
    let embedder = get_embedder(&config).map_err(|e| format!("Failed to create embedder: {}", e))?;

    Ok(TipsContext { store, embedder })
}

/// Run the tips list command
pub fn run_list() -> Result<(), String> {
    let ctx = open_tips()?;
    let tips = ctx.store.list().map_err(|e| e.to_string())?;

    if tips.is_empty() {
        println!("No tips yet. Add one with: companion tips add <topic> \"<tip>\"");
        return Ok(());
    }

    for (id, topic, text) in &tips {
        println!("[{}] {:12} {}", id, topic, text);
    }

    let count = ctx.store.count().map_err(|e| e.to_string())?;
    match ctx.store.dimension().map_err(|e| e.to_string())? {
        Some(d) => println!("\n{} tips, {} dimensions", count, d),
        None => println!("\n{} tips", count),
    }

    Ok(())
}

/// Run the tips add command
pub fn run_add(topic: &str, text: &str) -> Result<(), String> {
    let ctx = open_tips()?;

    let embedding = ctx
        .embedder
        .embed(text)
        .map_err(|e| format!("Failed to embed tip: {}", e))?;

    let id = ctx
        .store
        .add(topic, text, &embedding)
        .map_err(|e| format!("Failed to add tip: {}", e))?;

    println!("Added tip [{}] ({})", id, topic);
    Ok(())
}

/// Run the tips import command
pub fn run_import(file: &str) -> Result<(), String> {
    let content = fs::read_to_string(file).map_err(|e| format!("Failed to read {}: {}", file, e))?;
    let sources = parse_tips(&content)?;

    if sources.is_empty() {
        println!("No tips in {}", file);
        return Ok(());
    }

    let ctx = open_tips()?;

    let texts: Vec<&str> = sources.iter().map(|s| s.tip.as_str()).collect();
    let embeddings = ctx
        .embedder
        .embed_batch(&texts)
        .map_err(|e| format!("Failed to embed tips: {}", e))?;

    let mut added = 0;
    for (source, embedding) in sources.iter().zip(embeddings.iter()) {
        match ctx.store.add(&source.topic, &source.tip, embedding) {
            Ok(_) => added += 1,
            Err(e) => eprintln!("Skipped '{}': {}", source.topic, e),
        }
    }

    println!("Imported {} of {} tips", added, sources.len());
    Ok(())
}

/// Run the tips match command
pub fn run_match(query: &str, limit: usize) -> Result<(), String> {
    let ctx = open_tips()?;
    let corpus = ctx.store.load_all().map_err(|e| e.to_string())?;

    if corpus.is_empty() {
        println!("No tips to match against.");
        return Ok(());
    }

    let embedding = ctx
        .embedder
        .embed(query)
        .map_err(|e| format!("Failed to embed query: {}", e))?;

    let results = rank(&embedding, corpus.records(), limit);
    if results.is_empty() {
        println!("No matching tips.");
        return Ok(());
    }

    for r in results {
        println!("{:.3}  {:12} {}", r.score, r.tip.topic, r.tip.tip_text);
    }

    Ok(())
}

/// Parse a YAML (or JSON) list of `{topic, tip}` entries
fn parse_tips(content: &str) -> Result<Vec<TipSource>, String> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(content).map_err(|e| format!("Failed to parse tips: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tips_yaml() {
        let content = r#"
- topic: anxiety
  tip: Try 4-7-8 breathing
- topic: sleep
  tip_text: Wind down screens 1h before bed
"#;
        let tips = parse_tips(content).unwrap();
        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0].topic, "anxiety");
        assert_eq!(tips[1].tip, "Wind down screens 1h before bed");
    }

    #[test]
    fn test_parse_tips_json_and_empty() {
        let tips = parse_tips(r#"[{"topic": "focus", "tip": "Work in 25 minute blocks"}]"#).unwrap();
        assert_eq!(tips[0].topic, "focus");

        assert!(parse_tips("").unwrap().is_empty());
        assert!(parse_tips("topic: lonely").is_err());
    }
}
