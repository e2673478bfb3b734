//! Built-in code scorers.
//!
//! These are deterministic and read only the case and its trace.

use crate::scorer::{ScoreResult, Scorer, ScorerError, ScorerInput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use tracecheck_core::{SpanFilter, ToolId};

/// Minimum length of an expected-answer word to count as a keyword
const MIN_KEYWORD_LEN: usize = 4;

/// Category marking cases whose order does not exist
pub const ORDER_NOT_FOUND_CATEGORY: &str = "order_not_found";

/// Phrases that only make sense when describing a real order
pub const HALLUCINATION_SIGNALS: [&str; 8] = [
    "delivered",
    "shipped",
    "processing",
    "items:",
    "total:",
    "pro plan",
    "team plan",
    "enterprise",
];

// ============================================================================
// keyword_match
// ============================================================================

/// Fraction of the expected answer's keywords present in the output
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatch;

impl KeywordMatch {
    pub const NAME: &'static str = "keyword_match";

    /// Score an output against an expected answer
    pub fn compute(output: &str, expected: &str) -> f64 {
        if output.is_empty() || expected.is_empty() {
            return 0.0;
        }

        let keywords: Vec<String> = expected
            .split_whitespace()
            .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
            .map(str::to_lowercase)
            .collect();
        if keywords.is_empty() {
            return 1.0;
        }

        let output = output.to_lowercase();
        let hits = keywords.iter().filter(|k| output.contains(k.as_str())).count();
        hits as f64 / keywords.len() as f64
    }
}

#[async_trait]
impl Scorer for KeywordMatch {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError> {
        Ok(ScoreResult::applicable(
            Self::NAME,
            Self::compute(&input.output, &input.expected),
        ))
    }
}

// ============================================================================
// correct_tool_used
// ============================================================================

/// Whether the case's `expected_tool` appears among the invoked tools
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectToolUsed;

impl CorrectToolUsed {
    pub const NAME: &'static str = "correct_tool_used";
}

#[async_trait]
impl Scorer for CorrectToolUsed {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError> {
        let Some(expected) = input.metadata.expected_tool() else {
            return Ok(ScoreResult::not_applicable(Self::NAME));
        };

        let actual = input.trace.tool_names();
        let used = actual.contains(&expected);
        Ok(
            ScoreResult::applicable(Self::NAME, if used { 1.0 } else { 0.0 }).with_metadata(json!({
                "expected": expected,
                "actual_tools": actual,
            })),
        )
    }
}

// ============================================================================
// no_hallucination_on_missing_order
// ============================================================================

/// For missing-order cases, penalize answers that describe an order anyway
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHallucinationOnMissingOrder;

impl NoHallucinationOnMissingOrder {
    pub const NAME: &'static str = "no_hallucination_on_missing_order";
}

#[async_trait]
impl Scorer for NoHallucinationOnMissingOrder {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError> {
        if input.metadata.category() != Some(ORDER_NOT_FOUND_CATEGORY) {
            return Ok(ScoreResult::not_applicable(Self::NAME));
        }

        let output = input.output.to_lowercase();
        let detected: Vec<&str> = HALLUCINATION_SIGNALS
            .iter()
            .copied()
            .filter(|signal| output.contains(signal))
            .collect();

        let lookup = SpanFilter::tools().with_name(ToolId::LookupOrder.as_str());
        let confirmed_not_found = input
            .trace
            .spans(&lookup)
            .any(|s| s.output_text().to_lowercase().contains("not found"));

        let hallucinated = !detected.is_empty();
        Ok(
            ScoreResult::applicable(Self::NAME, if hallucinated { 0.0 } else { 1.0 })
                .with_metadata(json!({
                    "hallucination_detected": hallucinated,
                    "signals": detected,
                    "tool_confirmed_not_found": confirmed_not_found,
                })),
        )
    }
}

// ============================================================================
// expected_tool_path
// ============================================================================

/// How an invoked tool path is compared with the expected one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    /// Same distinct tools, order and repeats ignored
    #[default]
    Set,
    /// Identical ordered sequence, repeats included
    Sequence,
}

/// Compare invoked tools with the case's `expected_tool_path`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedToolPath {
    mode: PathMatch,
}

impl ExpectedToolPath {
    pub const NAME: &'static str = "expected_tool_path";

    pub fn new(mode: PathMatch) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PathMatch {
        self.mode
    }

    fn matches(&self, expected: &[&str], actual: &[&str]) -> bool {
        match self.mode {
            PathMatch::Set => {
                let expected: BTreeSet<&str> = expected.iter().copied().collect();
                let actual: BTreeSet<&str> = actual.iter().copied().collect();
                expected == actual
            }
            PathMatch::Sequence => expected == actual,
        }
    }
}

#[async_trait]
impl Scorer for ExpectedToolPath {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError> {
        let Some(expected) = input.metadata.expected_tool_path() else {
            return Ok(ScoreResult::not_applicable(Self::NAME));
        };

        let actual = input.trace.tool_sequence();
        let matched = self.matches(&expected, &actual);
        Ok(
            ScoreResult::applicable(Self::NAME, if matched { 1.0 } else { 0.0 }).with_metadata(
                json!({
                    "mode": self.mode,
                    "expected": expected,
                    "actual": actual,
                }),
            ),
        )
    }
}
