//! Post-processing of raw similarity-search hits: score extraction,
//! confidence labels, threshold filtering, ranking, and aggregate stats.


use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::database::SearchHit;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 20;
pub const DEFAULT_TOP_K: usize = 5;

/// Bound a requested result count into `[MIN_TOP_K, MAX_TOP_K]`.
///
/// Fractions are truncated; a non-finite request falls back to the default.
#[inline]
pub fn clamp_top_k(requested: f64) -> usize {
    if !requested.is_finite() {
        return DEFAULT_TOP_K;
    }

    let truncated = requested.trunc();
    if truncated <= MIN_TOP_K as f64 {
        MIN_TOP_K
    } else if truncated >= MAX_TOP_K as f64 {
        MAX_TOP_K
    } else {
        truncated as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
    Unknown,
}

impl Confidence {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very-high",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very-low",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Confidence {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a score; every boundary belongs to the higher label.
#[inline]
pub fn confidence_for(score: Option<f64>) -> Confidence {
    match score {
        None => Confidence::Unknown,
        Some(s) if s >= 0.9 => Confidence::VeryHigh,
        Some(s) if s >= 0.7 => Confidence::High,
        Some(s) if s >= 0.5 => Confidence::Medium,
        Some(s) if s >= 0.3 => Confidence::Low,
        Some(_) => Confidence::VeryLow,
    }
}

/// Relevance score of a hit: the top-level score, else metadata `score`,
/// else metadata `_score`. Non-finite numbers count as absent.
#[inline]
pub fn extract_score(hit: &SearchHit) -> Option<f64> {
    hit.score
        .filter(|s| s.is_finite())
        .or_else(|| metadata_score(&hit.metadata, "score"))
        .or_else(|| metadata_score(&hit.metadata, "_score"))
}

fn metadata_score(metadata: &Map<String, Value>, key: &str) -> Option<f64> {
    metadata
        .get(key)
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedHit {
    pub text: String,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResults {
    pub results: Vec<FormattedHit>,
    /// Number of hits before threshold filtering.
    pub total_available: usize,
    /// Mean of the defined scores among surviving hits.
    pub average_score: Option<f64>,
}

/// Score, label, filter, and rank raw hits.
///
/// Hits without a score always survive the threshold and sort after every
/// scored hit, keeping their original relative order.
#[inline]
pub fn format_hits(hits: Vec<SearchHit>, score_threshold: Option<f64>) -> FormattedResults {
    let total_available = hits.len();
    let threshold = score_threshold.filter(|t| t.is_finite());

    let mut results: Vec<FormattedHit> = hits
        .into_iter()
        .map(|hit| {
            let score = extract_score(&hit);
            FormattedHit {
                text: hit.text,
                metadata: hit.metadata,
                score,
                confidence: confidence_for(score),
            }
        })
        .filter(|hit| match (threshold, hit.score) {
            (Some(threshold), Some(score)) => score >= threshold,
            _ => true,
        })
        .collect();

    // sort_by is stable
    results.sort_by(|a, b| match (a.score, b.score) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let scores: Vec<f64> = results.iter().filter_map(|hit| hit.score).collect();
    let average_score = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    FormattedResults {
        results,
        total_available,
        average_score,
    }
}
