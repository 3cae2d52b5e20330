use crate::config::CompanionConfig;
use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Anything that turns a prompt into reply text
pub trait Generator: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// Client for an OpenAI-compatible `/completions` endpoint (LM Studio by default)
pub struct CompletionClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn from_config(config: &CompanionConfig) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            api_key: config.api_key.clone(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            GenerationError::Connect(err.to_string())
        } else {
            GenerationError::Request(err.to_string())
        }
    }
}

impl Generator for CompletionClient {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("Requesting completion from {} ({})", self.base_url, self.model);

        let mut builder = self
            .client
            .post(format!("{}/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().map_err(|e| self.classify(e))?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

/// Extract the first choice's text from a completion response body
fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.text.trim().to_string())
        .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))
}

/// Build the completion prompt for one user message
pub fn build_prompt(preamble: &str, user_input: &str) -> String {
    format!("{}\nUser: {}\nAI:", preamble, user_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_trims_text() {
        let body = r#"{"id":"cmpl-1","choices":[{"index":0,"text":"  You're not alone.\n"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "You're not alone.");
    }

    #[test]
    fn test_parse_completion_without_choices() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(GenerationError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("You are a kind mental-health assistant.", "I can't sleep");
        assert_eq!(
            prompt,
            "You are a kind mental-health assistant.\nUser: I can't sleep\nAI:"
        );
    }

    #[test]
    fn test_unreachable_backend_is_connect_error() {
        let mut config = CompanionConfig::default();
        // Port 9 (discard) on localhost is closed on test machines
        config.backend_url = "http://127.0.0.1:9/v1".to_string();
        config.timeout_secs = 2;

        let client = CompletionClient::from_config(&config).unwrap();
        let err = client.complete("hello").unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Connect(_) | GenerationError::Timeout(_) | GenerationError::Request(_)
        ));
    }
}
