//! Scorer contract.
//!
//! A scorer reads a finished case (input, output, expected, metadata, and the
//! case's span trace) and produces a [`ScoreResult`]. Scorers never see each
//! other's results and never mutate the trace, so a case's scorers run
//! concurrently and one failing scorer does not affect the rest.

use crate::case::CaseMetadata;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracecheck_core::{CaseTrace, LlmError};

/// A score, or a marker that the scorer does not apply to this case
///
/// Not-applicable results are excluded from aggregates; they never count as
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreValue {
    Applicable(f64),
    NotApplicable,
}

impl ScoreValue {
    pub fn score(&self) -> Option<f64> {
        match self {
            ScoreValue::Applicable(s) => Some(*s),
            ScoreValue::NotApplicable => None,
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, ScoreValue::Applicable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub name: String,
    pub value: ScoreValue,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ScoreResult {
    /// An applicable score, clamped to `[0, 1]`
    pub fn applicable(name: impl Into<String>, score: f64) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            name: name.into(),
            value: ScoreValue::Applicable(score),
            metadata: Value::Null,
        }
    }

    pub fn not_applicable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ScoreValue::NotApplicable,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn score(&self) -> Option<f64> {
        self.value.score()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScorerError {
    /// Judge model picked a choice outside the legal set
    #[error("Invalid choice {choice:?} from judge {scorer}")]
    InvalidChoice { scorer: String, choice: String },

    /// Judge response did not contain a usable verdict
    #[error("Malformed verdict from judge {scorer}: {reason}")]
    MalformedVerdict { scorer: String, reason: String },

    #[error("Judge call failed: {0}")]
    Judge(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Scorer panicked: {0}")]
    Panicked(String),
}

/// Everything a scorer may read about a finished case
#[derive(Debug, Clone)]
pub struct ScorerInput {
    pub input: String,
    pub output: String,
    pub expected: String,
    pub metadata: CaseMetadata,
    pub trace: CaseTrace,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Stable name used as the key in reports
    fn name(&self) -> &str;

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError>;
}

/// Per-scorer outcome for one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerEntry {
    Scored(ScoreResult),
    Failed(String),
}

impl ScorerEntry {
    pub fn result(&self) -> Option<&ScoreResult> {
        match self {
            ScorerEntry::Scored(r) => Some(r),
            ScorerEntry::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScorerEntry::Failed(_))
    }
}

/// Ordered collection of scorers applied to every case
#[derive(Clone, Default)]
pub struct Scorers {
    scorers: Vec<Arc<dyn Scorer>>,
}

impl Scorers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Scorer + 'static>(mut self, scorer: S) -> Self {
        self.scorers.push(Arc::new(scorer));
        self
    }

    pub fn add_arc(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.scorers.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Run every scorer against one case.
    ///
    /// Scorers run concurrently. Errors and panics are captured per scorer as
    /// [`ScorerEntry::Failed`]; results come back in registration order.
    pub async fn score_all(&self, input: &ScorerInput) -> Vec<(String, ScorerEntry)> {
        let futures = self.scorers.iter().map(|scorer| async move {
            let name = scorer.name().to_string();
            let outcome = AssertUnwindSafe(scorer.score(input)).catch_unwind().await;
            let entry = match outcome {
                Ok(Ok(result)) => ScorerEntry::Scored(result),
                Ok(Err(e)) => {
                    tracing::warn!(scorer = %name, error = %e, "Scorer failed");
                    ScorerEntry::Failed(e.to_string())
                }
                Err(panic) => {
                    let e = ScorerError::Panicked(panic_message(panic.as_ref()));
                    tracing::warn!(scorer = %name, error = %e, "Scorer panicked");
                    ScorerEntry::Failed(e.to_string())
                }
            };
            (name, entry)
        });
        join_all(futures).await
    }
}

impl std::fmt::Debug for Scorers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorers")
            .field("names", &self.names())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
