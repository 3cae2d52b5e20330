use thiserror::Error;

/// Failures talking to the text generation backend
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Request(String),
}

/// Failures producing an embedding for user text
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding has {actual} dimensions, corpus expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures loading or writing the tip corpus
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("tip corpus unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt tip record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("invalid tip: {0}")]
    Invalid(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Failures appending to or reading the mood log
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("log database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("log writer lock poisoned")]
    Poisoned,

    #[error("invalid check-in: {0}")]
    InvalidCheckIn(String),
}

/// Failures reading or updating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
