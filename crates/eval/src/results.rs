//! Per-case reports and run summaries.

use crate::case::CaseMetadata;
use crate::scorer::ScorerEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracecheck_core::Termination;
use uuid::Uuid;

/// Why a case did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseError {
    /// The loop did not finish within the per-case timeout
    TimedOut { after_ms: u64 },
    /// The loop returned an error
    Agent { message: String },
}

impl std::fmt::Display for CaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseError::TimedOut { after_ms } => write!(f, "timed out after {}ms", after_ms),
            CaseError::Agent { message } => write!(f, "agent error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Completed {
        termination: Termination,
        model_calls: usize,
        rounds: usize,
    },
    Errored(CaseError),
}

impl CaseStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, CaseStatus::Completed { .. })
    }
}

/// Outcome of one eval case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: Uuid,
    /// Position in the dataset
    pub index: usize,
    pub input: String,
    pub expected: String,
    #[serde(default)]
    pub metadata: CaseMetadata,
    /// Final answer; `None` for errored cases
    pub output: Option<String>,
    pub status: CaseStatus,
    /// Scorer name to outcome; empty for errored cases
    pub scores: BTreeMap<String, ScorerEntry>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl CaseReport {
    pub fn score(&self, scorer: &str) -> Option<f64> {
        self.scores.get(scorer)?.result()?.score()
    }
}

/// Aggregate of one scorer across completed cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerSummary {
    pub name: String,
    /// Mean over applicable cases; `None` when no case was applicable
    pub mean: Option<f64>,
    pub applicable: usize,
    pub not_applicable: usize,
    pub errors: usize,
}

/// Results of one eval run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub dataset_name: String,
    pub started_at: DateTime<Utc>,
    pub total_cases: usize,
    pub completed: usize,
    pub errored: usize,
    /// Per-scorer aggregates, ordered by scorer name
    pub scorers: Vec<ScorerSummary>,
    /// Per-case reports in dataset order
    pub cases: Vec<CaseReport>,
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
}

impl EvalSummary {
    pub fn from_reports(
        dataset_name: impl Into<String>,
        started_at: DateTime<Utc>,
        cases: Vec<CaseReport>,
        total_duration: Duration,
    ) -> Self {
        let completed = cases.iter().filter(|c| c.status.is_completed()).count();

        let mut acc: BTreeMap<&str, (f64, ScorerSummary)> = BTreeMap::new();
        for case in cases.iter().filter(|c| c.status.is_completed()) {
            for (name, entry) in &case.scores {
                let (sum, summary) = acc.entry(name.as_str()).or_insert_with(|| {
                    (
                        0.0,
                        ScorerSummary {
                            name: name.clone(),
                            mean: None,
                            applicable: 0,
                            not_applicable: 0,
                            errors: 0,
                        },
                    )
                });
                match entry.result().map(|r| r.score()) {
                    Some(Some(score)) => {
                        *sum += score;
                        summary.applicable += 1;
                    }
                    Some(None) => summary.not_applicable += 1,
                    None => summary.errors += 1,
                }
            }
        }

        let scorers = acc
            .into_values()
            .map(|(sum, mut summary)| {
                if summary.applicable > 0 {
                    summary.mean = Some(sum / summary.applicable as f64);
                }
                summary
            })
            .collect();

        Self {
            dataset_name: dataset_name.into(),
            started_at,
            total_cases: cases.len(),
            completed,
            errored: cases.len() - completed,
            scorers,
            cases,
            total_duration,
        }
    }

    pub fn scorer(&self, name: &str) -> Option<&ScorerSummary> {
        self.scorers.iter().find(|s| s.name == name)
    }

    pub fn errored_cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.status.is_completed())
    }

    /// Print a human-readable summary to stdout
    pub fn print_summary(&self) {
        println!();
        println!("=== Evaluation Summary ===");
        println!("Dataset: {}", self.dataset_name);
        println!(
            "Cases: {} total, {} completed, {} errored",
            self.total_cases, self.completed, self.errored
        );
        println!("Duration: {:.2}s", self.total_duration.as_secs_f64());
        println!();

        if !self.scorers.is_empty() {
            println!("Scores:");
            let width = self.scorers.iter().map(|s| s.name.len()).max().unwrap_or(0);
            for s in &self.scorers {
                let mean = s
                    .mean
                    .map(|m| format!("{:>6.1}%", m * 100.0))
                    .unwrap_or_else(|| "     -".to_string());
                println!(
                    "  {:<width$}  {}  ({} scored, {} n/a, {} errors)",
                    s.name,
                    mean,
                    s.applicable,
                    s.not_applicable,
                    s.errors,
                    width = width
                );
            }
        }

        let errored: Vec<&CaseReport> = self.errored_cases().collect();
        if !errored.is_empty() {
            println!();
            println!("Errored cases:");
            for case in errored {
                if let CaseStatus::Errored(e) = &case.status {
                    println!("  [{}] {}: {}", case.index, truncate(&case.input, 60), e);
                }
            }
        }
    }

    /// Write the full summary as pretty JSON
    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
