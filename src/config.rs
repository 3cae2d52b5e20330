use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Embedding model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub alias: &'static str,
    pub name: &'static str,
    pub model_type: &'static str,
    pub dim: usize,
    pub description: &'static str,
}

/// Suggested embedding models
pub static SUGGESTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        alias: "lite",
        name: "lite",
        model_type: "lite",
        dim: 384,
        description: "N-gram hashing - offline, no server needed",
    },
    ModelInfo {
        alias: "minilm",
        name: "all-MiniLM-L6-v2",
        model_type: "server",
        dim: 384,
        description: "Default. Fast general-purpose sentence embeddings",
    },
    ModelInfo {
        alias: "bge-small",
        name: "BAAI/bge-small-en-v1.5",
        model_type: "server",
        dim: 384,
        description: "Small BGE model, good quality",
    },
    ModelInfo {
        alias: "bge-base",
        name: "BAAI/bge-base-en-v1.5",
        model_type: "server",
        dim: 768,
        description: "Balanced quality and speed",
    },
    ModelInfo {
        alias: "nomic",
        name: "nomic-embed-text-v1.5",
        model_type: "server",
        dim: 768,
        description: "Bundled with LM Studio",
    },
];

pub const DEFAULT_EMBEDDING_MODEL: &str = "minilm";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_MODEL: &str = "mistral-7b-instruct-v0.2";
pub const DEFAULT_PREAMBLE: &str = "You are a kind mental-health assistant.";

/// Name of the per-project data directory
pub const DATA_DIR_NAME: &str = ".companion";

/// Resolve a model input to (model_name, model_type)
pub fn resolve_model(model_input: &str) -> (String, String) {
    if let Some(info) = SUGGESTED_MODELS.iter().find(|m| m.alias == model_input) {
        return (info.name.to_string(), info.model_type.to_string());
    }

    // Anything else is passed through to the embedding server
    (model_input.to_string(), "server".to_string())
}

/// Where tip matches are logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Csv,
    Sqlite,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(LogFormat::Csv),
            "sqlite" => Ok(LogFormat::Sqlite),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Csv => write!(f, "csv"),
            LogFormat::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Settings for a companion data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub backend_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub embedding_model: String,
    /// Falls back to `backend_url` when unset
    pub embedding_url: Option<String>,
    pub log_format: LogFormat,
    pub log_file: String,
    pub preamble: String,

    /// Only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 150,
            temperature: 0.7,
            timeout_secs: 30,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_url: None,
            log_format: LogFormat::Csv,
            log_file: "mood_logs.csv".to_string(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            api_key: None,
        }
    }
}

/// Keys accepted by `companion config`
pub const CONFIG_KEYS: &[&str] = &[
    "backend_url",
    "model",
    "max_tokens",
    "temperature",
    "timeout_secs",
    "embedding_model",
    "embedding_url",
    "log_format",
    "log_file",
    "preamble",
];

impl CompanionConfig {
    /// Load config from a data directory, then apply environment overrides
    pub fn load(data_path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&config_file(data_path))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load only the file, without environment overrides
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Persist to `config.yaml`; the API key is never written
    pub fn save(&self, data_path: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(data_path)?;
        let content = serde_yaml::to_string(self)?;
        fs::write(config_file(data_path), content)?;
        Ok(())
    }

    /// Apply `COMPANION_*` overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COMPANION_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(model) = lookup("COMPANION_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("COMPANION_EMBEDDING_URL") {
            self.embedding_url = Some(url);
        }
        if let Some(secs) = lookup("COMPANION_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            self.timeout_secs = secs;
        }
        self.api_key = lookup("COMPANION_API_KEY").filter(|k| !k.is_empty());
    }

    /// Get a value by key, as displayed by `companion config`
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "backend_url" => self.backend_url.clone(),
            "model" => self.model.clone(),
            "max_tokens" => self.max_tokens.to_string(),
            "temperature" => self.temperature.to_string(),
            "timeout_secs" => self.timeout_secs.to_string(),
            "embedding_model" => self.embedding_model.clone(),
            "embedding_url" => self.embedding_url.clone().unwrap_or_default(),
            "log_format" => self.log_format.to_string(),
            "log_file" => self.log_file.clone(),
            "preamble" => self.preamble.clone(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Set a value by key, validating numeric and enum fields
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "backend_url" => self.backend_url = value.trim_end_matches('/').to_string(),
            "model" => self.model = value.to_string(),
            "max_tokens" => self.max_tokens = value.parse().map_err(|_| invalid())?,
            "temperature" => {
                let t: f32 = value.parse().map_err(|_| invalid())?;
                if !(0.0..=2.0).contains(&t) {
                    return Err(invalid());
                }
                self.temperature = t;
            }
            "timeout_secs" => {
                let secs: u64 = value.parse().map_err(|_| invalid())?;
                if secs == 0 {
                    return Err(invalid());
                }
                self.timeout_secs = secs;
            }
            "embedding_model" => self.embedding_model = value.to_string(),
            "embedding_url" => {
                self.embedding_url = if value.is_empty() {
                    None
                } else {
                    Some(value.trim_end_matches('/').to_string())
                }
            }
            "log_format" => self.log_format = value.parse().map_err(|_| invalid())?,
            "log_file" => self.log_file = value.to_string(),
            "preamble" => self.preamble = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// All key/value pairs in display order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        CONFIG_KEYS
            .iter()
            .filter_map(|k| self.get(k).ok().map(|v| (*k, v)))
            .collect()
    }

    pub fn resolved_embedding_model(&self) -> (String, String) {
        resolve_model(&self.embedding_model)
    }

    pub fn embedding_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.backend_url)
    }
}

/// Files inside a data directory
pub fn config_file(data_path: &Path) -> PathBuf {
    data_path.join("config.yaml")
}

pub fn tips_db(data_path: &Path) -> PathBuf {
    data_path.join("tips.db")
}

/// Log file path; relative names live inside the data directory
pub fn log_path(data_path: &Path, config: &CompanionConfig) -> PathBuf {
    let file = match config.log_format {
        LogFormat::Csv => config.log_file.clone(),
        LogFormat::Sqlite => "mood_logs.db".to_string(),
    };
    let path = PathBuf::from(file);
    if path.is_absolute() {
        path
    } else {
        data_path.join(path)
    }
}

/// Find the .companion directory, searching upward from current directory
pub fn find_data_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(DATA_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    if let Ok(path) = std::env::var("COMPANION_PATH") {
        let candidate = PathBuf::from(path);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    let fallback = dirs::data_dir()?.join("companion");
    if fallback.is_dir() {
        return Some(fallback);
    }

    None
}
