use crate::embeddings::similarity;
use crate::types::{MatchedTip, TipRecord};

/// A corpus entry paired with its similarity to a query
#[derive(Debug, Clone, Copy)]
pub struct ScoredTip<'a> {
    pub tip: &'a TipRecord,
    pub score: f64,
}

impl ScoredTip<'_> {
    pub fn to_matched(&self) -> MatchedTip {
        MatchedTip {
            topic: self.tip.topic.clone(),
            tip_text: self.tip.tip_text.clone(),
            score: self.score,
        }
    }
}

/// Picks the tip closest to a query embedding
///
/// Implementations must be deterministic for a given corpus order: among equal
/// scores the earliest candidate wins.
pub trait TipMatcher: Send + Sync {
    fn best_match<'a>(&self, query: &[f32], corpus: &'a [TipRecord]) -> Option<ScoredTip<'a>>;
}

/// Exhaustive cosine scan over the corpus
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearMatcher;

impl TipMatcher for LinearMatcher {
    fn best_match<'a>(&self, query: &[f32], corpus: &'a [TipRecord]) -> Option<ScoredTip<'a>> {
        let mut best: Option<ScoredTip<'a>> = None;

        for tip in corpus {
            // Zero-norm vectors score -1 and are never selected
            let Some(score) = similarity(query, &tip.embedding) else {
                continue;
            };

            if best.map_or(true, |b| score > b.score) {
                best = Some(ScoredTip { tip, score });
            }
        }

        best
    }
}

/// All scorable tips sorted by descending similarity, ties in corpus order
pub fn rank<'a>(query: &[f32], corpus: &'a [TipRecord], limit: usize) -> Vec<ScoredTip<'a>> {
    let mut results: Vec<ScoredTip<'a>> = corpus
        .iter()
        .filter_map(|tip| similarity(query, &tip.embedding).map(|score| ScoredTip { tip, score }))
        .collect();

    // sort_by is stable, so equal scores keep corpus order
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}
