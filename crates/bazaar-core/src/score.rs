//! Listing Visibility Score

use serde::{Deserialize, Serialize};

/// The visibility score snapshot for a listing.
///
/// `previous_score` is always the value held immediately before the
/// latest applied update: a single-step delta for rendering, not a
/// history. The store owns that field. Whatever a server response claims,
/// the applied snapshot's `previous_score` is the locally held prior
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub score: f64,
    pub previous_score: Option<f64>,
    pub label: String,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization_message: Option<String>,
}

impl ScoreSnapshot {
    pub fn new(score: f64, label: impl Into<String>) -> Self {
        Self {
            score,
            previous_score: None,
            label: label.into(),
            suggestions: Vec::new(),
            normalized_score: None,
            normalization_message: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// One-step delta since the previous applied value, when one exists.
    pub fn delta(&self) -> Option<f64> {
        self.previous_score.map(|prev| self.score - prev)
    }
}
