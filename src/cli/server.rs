use crate::companion::Companion;
use crate::error::LogError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

/// Largest request body accepted, in bytes
const MAX_BODY: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    mood: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoodRequest {
    #[serde(default)]
    mood: String,
    #[serde(default)]
    intensity: Option<u8>,
    #[serde(default)]
    notes: String,
}

/// Run the serve command
pub fn run_serve(bind: &str) -> Result<(), String> {
    let companion = Arc::new(Companion::open()?);
    let server = Server::http(bind).map_err(|e| format!("Failed to bind {}: {}", bind, e))?;

    if let Some(path) = companion.data_path() {
        info!("Using data directory {}", path.display());
    }
    info!("Listening on {}", bind);
    println!("Companion API listening on http://{}", bind);

    for request in server.incoming_requests() {
        let companion = Arc::clone(&companion);
        thread::spawn(move || serve_one(&companion, request));
    }

    Ok(())
}

fn serve_one(companion: &Companion, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let mut body = String::new();
    let read = request
        .as_reader()
        .take(MAX_BODY)
        .read_to_string(&mut body);

    let (status, payload) = match read {
        Ok(_) => handle(companion, &method, &url, &body),
        Err(e) => (400, json!({ "error": format!("Unreadable body: {}", e) })),
    };

    debug!("{} {} -> {}", method, url, status);

    let mut response = Response::from_string(payload.to_string()).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("Failed to send response: {}", e);
    }
}

/// Route one request to a JSON response
fn handle(companion: &Companion, method: &Method, url: &str, body: &str) -> (u16, Value) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    match (method, path) {
        (Method::Get, "/") => (
            200,
            json!({
                "message": "AI Mental Health Companion API",
                "version": env!("CARGO_PKG_VERSION"),
                "tips": companion.corpus().len(),
            }),
        ),
        (Method::Post, "/api/chat") => handle_chat(companion, body),
        (Method::Get, "/api/logs") => handle_logs(companion, query),
        (Method::Post, "/api/mood") => handle_mood(companion, body),
        (Method::Get, "/api/analytics") => match companion.analytics() {
            Ok(stats) => (200, json!(stats)),
            Err(e) => (500, json!({ "error": format!("Failed to read logs: {}", e) })),
        },
        (_, "/" | "/api/chat" | "/api/logs" | "/api/mood" | "/api/analytics") => {
            (405, json!({ "error": "Method not allowed" }))
        }
        _ => (404, json!({ "error": format!("No route for {}", path) })),
    }
}

fn handle_chat(companion: &Companion, body: &str) -> (u16, Value) {
    let request: ChatRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return (400, json!({ "error": format!("Invalid JSON: {}", e) })),
    };

    match companion.turn(&request.message, request.mood.as_deref()) {
        Some(outcome) => (
            200,
            json!({
                "response": outcome.output,
                "reply": outcome.reply,
                "degraded": outcome.degraded,
                "tip": outcome.tip,
                "timestamp": outcome.entry.timestamp,
                "log_warning": outcome.log_warning.map(|e| e.to_string()),
            }),
        ),
        None => (400, json!({ "error": "message must not be empty" })),
    }
}

fn handle_mood(companion: &Companion, body: &str) -> (u16, Value) {
    let request: MoodRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return (400, json!({ "error": format!("Invalid JSON: {}", e) })),
    };

    match companion.check_in(&request.mood, request.intensity, &request.notes) {
        Ok(entry) => (
            200,
            json!({
                "message": format!("Mood '{}' logged", entry.mood),
                "mood_entry": entry,
            }),
        ),
        Err(e @ LogError::InvalidCheckIn(_)) => (400, json!({ "error": e.to_string() })),
        Err(e) => (500, json!({ "error": format!("Failed to log mood: {}", e) })),
    }
}

fn handle_logs(companion: &Companion, query: &str) -> (u16, Value) {
    let limit = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "limit")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(20);

    match companion.log().read_all() {
        Ok(entries) => {
            let skip = entries.len().saturating_sub(limit);
            (200, json!({ "entries": &entries[skip..] }))
        }
        Err(e) => (500, json!({ "error": format!("Failed to read logs: {}", e) })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::TipCorpus;
    use crate::embeddings::LiteEmbedder;
    use crate::error::GenerationError;
    use crate::generation::Generator;
    use crate::logstore::SqliteLogStore;

    struct Echo;

    impl Generator for Echo {
        fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            Ok(format!("echo: {}", prompt.lines().nth(1).unwrap_or_default()))
        }
    }

    fn companion() -> Companion {
        Companion::new(
            Box::new(Echo),
            Box::new(LiteEmbedder::new()),
            Arc::new(TipCorpus::empty()),
            Box::new(SqliteLogStore::in_memory().unwrap()),
        )
    }

    #[test]
    fn test_home() {
        let (status, body) = handle(&companion(), &Method::Get, "/", "");
        assert_eq!(status, 200);
        assert!(body["message"].as_str().unwrap().contains("AI Mental Health Companion API"));
    }

    #[test]
    fn test_chat_and_logs() {
        let c = companion();

        let (status, body) = handle(
            &c,
            &Method::Post,
            "/api/chat",
            r#"{"message": "Hello, how are you?", "mood": "happy"}"#,
        );
        assert_eq!(status, 200);
        assert_eq!(body["reply"], "echo: User: Hello, how are you?");
        assert_eq!(body["degraded"], false);
        assert!(body["tip"].is_null());
        assert!(body["timestamp"].is_string());

        handle(&c, &Method::Post, "/api/chat", r#"{"message": "second"}"#);

        let (status, body) = handle(&c, &Method::Get, "/api/logs?limit=1", "");
        assert_eq!(status, 200);
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["user_input"], "second");
    }

    #[test]
    fn test_chat_rejects_empty_and_bad_json() {
        let c = companion();
        let (status, _) = handle(&c, &Method::Post, "/api/chat", r#"{"message": "  "}"#);
        assert_eq!(status, 400);

        let (status, _) = handle(&c, &Method::Post, "/api/chat", "not json");
        assert_eq!(status, 400);
    }

    #[test]
    fn test_mood_check_in() {
        let c = companion();
        let (status, body) = handle(
            &c,
            &Method::Post,
            "/api/mood",
            r#"{"mood": "happy", "intensity": 8, "notes": "Feeling great today!"}"#,
        );
        assert_eq!(status, 200);
        assert!(body["message"].is_string());
        assert_eq!(body["mood_entry"]["mood"], "happy");
        assert_eq!(body["mood_entry"]["intensity"], 8);

        let (status, _) = handle(&c, &Method::Post, "/api/mood", r#"{"mood": "sad", "intensity": 42}"#);
        assert_eq!(status, 400);
        let (status, _) = handle(&c, &Method::Post, "/api/mood", r#"{"notes": "no mood"}"#);
        assert_eq!(status, 400);
    }

    #[test]
    fn test_analytics() {
        let c = companion();
        handle(&c, &Method::Post, "/api/chat", r#"{"message": "hello", "mood": "calm"}"#);
        handle(&c, &Method::Post, "/api/mood", r#"{"mood": "calm", "intensity": 3}"#);

        let (status, body) = handle(&c, &Method::Get, "/api/analytics", "");
        assert_eq!(status, 200);
        assert_eq!(body["overview"]["total_turns"], 1);
        assert_eq!(body["overview"]["check_ins"], 1);
        assert_eq!(body["mood_analytics"]["by_mood"]["calm"], 2);
        assert_eq!(body["mood_analytics"]["most_common"], "calm");
    }

    #[test]
    fn test_unknown_routes() {
        let c = companion();
        assert_eq!(handle(&c, &Method::Get, "/api/journal", "").0, 404);
        assert_eq!(handle(&c, &Method::Get, "/api/chat", "").0, 405);
        assert_eq!(handle(&c, &Method::Get, "/api/mood", "").0, 405);
    }
}
