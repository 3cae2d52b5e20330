use crate::config::CompanionConfig;
use crate::error::EmbeddingError;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Embedding dimension for lite embedder
pub const LITE_DIM: usize = 384;

/// Trait for embedding implementations
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

// =============================================================================
// LiteEmbedder - N-gram hashing, no server required
// =============================================================================

/// Lightweight embedder using character n-gram hashing
pub struct LiteEmbedder {
    dim: usize,
}

impl Default for LiteEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteEmbedder {
    pub fn new() -> Self {
        Self { dim: LITE_DIM }
    }

    #[cfg(test)]
    pub fn with_dim(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for LiteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        let text = text.trim();
        let mut vector = vec![0.0f32; self.dim];

        // Character trigrams
        let chars: Vec<char> = text.chars().collect();
        for i in 0..chars.len().saturating_sub(2) {
            let trigram: String = chars[i..i + 3].iter().collect();
            let idx = (md5_hash(&trigram) % self.dim as u128) as usize;
            vector[idx] += 1.0;
        }

        // Word unigrams count double
        for word in text.split_whitespace() {
            let idx = (md5_hash(word) % self.dim as u128) as usize;
            vector[idx] += 2.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

fn md5_hash(text: &str) -> u128 {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    u128::from_be_bytes(hasher.finalize().into())
}

// =============================================================================
// HttpEmbedder - OpenAI-compatible /embeddings endpoint
// =============================================================================

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embedder backed by an embedding server (LM Studio, llama.cpp, OpenAI)
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("no embedding in response".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} embeddings from {}", texts.len(), self.base_url);

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::Request(format!("{}: {}", status, body)));
        }

        let mut parsed: EmbedResponse = response
            .json()
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// =============================================================================
// Cosine similarity
// =============================================================================

/// Cosine similarity in [-1, 1]; a zero-norm vector or a length mismatch scores -1
#[cfg(test)]
pub fn cosine_similarity(vec_a: &[f32], vec_b: &[f32]) -> f64 {
    similarity(vec_a, vec_b).unwrap_or(-1.0)
}

/// Cosine similarity, or `None` when it is undefined
pub(crate) fn similarity(vec_a: &[f32], vec_b: &[f32]) -> Option<f64> {
    if vec_a.len() != vec_b.len() || vec_a.is_empty() {
        return None;
    }

    let dot: f32 = vec_a.iter().zip(vec_b.iter()).map(|(a, b)| a * b).sum();
    let norm_a: f32 = vec_a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = vec_b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    // NaN or infinite components poison the score; treat them as unscorable
    let score = (dot / (norm_a * norm_b)) as f64;
    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}

// =============================================================================
// Embedder factory
// =============================================================================

/// Build the embedder named by the config
pub fn get_embedder(config: &CompanionConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let (model_name, model_type) = config.resolved_embedding_model();

    if model_type == "lite" {
        return Ok(Box::new(LiteEmbedder::new()));
    }

    let embedder = HttpEmbedder::new(
        config.embedding_url(),
        &model_name,
        config.api_key.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Box::new(embedder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lite_embedder() {
        let embedder = LiteEmbedder::new();
        let embedding = embedder.embed("hello world").unwrap();

        assert_eq!(embedding.len(), LITE_DIM);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_lite_embedder_empty_text_is_zero_vector() {
        let embedder = LiteEmbedder::with_dim(16);
        let embedding = embedder.embed("   ").unwrap();
        assert_eq!(embedding.len(), 16);
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_vector_scores_minus_one() {
        let zero = vec![0.0, 0.0, 0.0];
        let a = vec![0.3, 0.4, 0.5];
        assert_eq!(cosine_similarity(&zero, &a), -1.0);
        assert_eq!(cosine_similarity(&a, &zero), -1.0);
        assert_eq!(cosine_similarity(&zero, &zero), -1.0);
    }

    #[test]
    fn test_non_finite_components_are_unscorable() {
        assert_eq!(similarity(&[f32::NAN, 0.0], &[1.0, 0.0]), None);
        assert_eq!(similarity(&[1.0, 0.0], &[f32::INFINITY, 1.0]), None);
        assert_eq!(cosine_similarity(&[f32::NAN, 0.0], &[1.0, 0.0]), -1.0);
    }

    #[test]
    fn test_length_mismatch_scores_minus_one() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), -1.0);
    }

    #[test]
    fn test_similar_texts_have_higher_similarity() {
        let embedder = LiteEmbedder::new();

        let a = embedder.embed("I feel anxious about exams").unwrap();
        let b = embedder.embed("anxious about my exams").unwrap();
        let c = embedder.embed("cannot fall asleep at night").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_factory_lite() {
        let mut config = CompanionConfig::default();
        config.embedding_model = "lite".to_string();
        let embedder = get_embedder(&config).unwrap();
        assert_eq!(embedder.embed("hi there").unwrap().len(), LITE_DIM);
    }
}
