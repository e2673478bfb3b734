//! Eval runner.
//!
//! Runs the conversation loop over every case of a dataset with bounded
//! concurrency, scores each completed case from its trace, and aggregates the
//! reports. Reports keep dataset order regardless of completion order.

use crate::case::EvalCase;
use crate::dataset::{Dataset, DatasetError};
use crate::results::{CaseError, CaseReport, CaseStatus, EvalSummary};
use crate::scorer::{ScorerInput, Scorers};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracecheck_core::{ConversationLoop, InMemoryTraceRecorder, TraceContext, TraceRecorder};
use uuid::Uuid;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

/// Progress events emitted while a run proceeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalProgress {
    /// Dataset loaded, cases about to start
    Started { total: usize },
    /// One case finished, completed or errored
    CaseCompleted {
        index: usize,
        completed: usize,
        total: usize,
        success: bool,
    },
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum cases in flight (at least 1)
    pub concurrency: usize,
    /// Wall-clock limit for one case's conversation loop
    pub case_timeout: Duration,
    /// Keep each case's spans in the recorder after it is scored
    pub retain_traces: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            case_timeout: DEFAULT_CASE_TIMEOUT,
            retain_traces: false,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Keep spans for inspection through [`EvalRunner::recorder`] after the run
    #[must_use]
    pub fn with_retained_traces(mut self, retain: bool) -> Self {
        self.retain_traces = retain;
        self
    }
}

/// Runs a conversation loop over eval cases and scores the results
pub struct EvalRunner {
    agent: ConversationLoop,
    scorers: Scorers,
    recorder: Arc<dyn TraceRecorder>,
    config: RunnerConfig,
}

impl EvalRunner {
    /// Runner with an in-memory trace recorder.
    ///
    /// Each case's spans are dropped once it is scored unless
    /// [`RunnerConfig::retain_traces`] is set.
    pub fn new(agent: ConversationLoop, scorers: Scorers, config: RunnerConfig) -> Self {
        Self {
            agent,
            scorers,
            recorder: Arc::new(InMemoryTraceRecorder::new()),
            config,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn TraceRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &Arc<dyn TraceRecorder> {
        &self.recorder
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub async fn run(
        &self,
        dataset: &dyn Dataset,
        sample_size: Option<usize>,
    ) -> Result<EvalSummary, EvalError> {
        self.run_with_progress(dataset, sample_size, |_| {}).await
    }

    pub async fn run_with_progress<F>(
        &self,
        dataset: &dyn Dataset,
        sample_size: Option<usize>,
        on_progress: F,
    ) -> Result<EvalSummary, EvalError>
    where
        F: Fn(EvalProgress) + Send + Sync,
    {
        let cases = dataset.load(sample_size).await?;
        Ok(self.run_cases(dataset.name(), cases, on_progress).await)
    }

    /// Run cases already in hand
    pub async fn run_cases<F>(&self, dataset_name: &str, cases: Vec<EvalCase>, on_progress: F) -> EvalSummary
    where
        F: Fn(EvalProgress) + Send + Sync,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let total = cases.len();

        on_progress(EvalProgress::Started { total });
        tracing::info!(
            dataset = dataset_name,
            cases = total,
            concurrency = self.config.concurrency,
            scorers = ?self.scorers.names(),
            "Starting eval run"
        );

        let completed = AtomicUsize::new(0);
        let reports: Vec<CaseReport> = stream::iter(cases.into_iter().enumerate())
            .map(|(index, case)| {
                let completed = &completed;
                let on_progress = &on_progress;
                async move {
                    let report = self.evaluate_case(index, case).await;
                    let count = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(EvalProgress::CaseCompleted {
                        index,
                        completed: count,
                        total,
                        success: report.status.is_completed(),
                    });
                    report
                }
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let summary = EvalSummary::from_reports(dataset_name, started_at, reports, start.elapsed());
        tracing::info!(
            dataset = dataset_name,
            completed = summary.completed,
            errored = summary.errored,
            duration_ms = summary.total_duration.as_millis() as u64,
            "Eval run finished"
        );
        summary
    }

    /// Run and score a single case
    pub async fn evaluate_case(&self, index: usize, case: EvalCase) -> CaseReport {
        let case_id = Uuid::now_v7();
        let trace = TraceContext::new(case_id, self.recorder.clone());
        let start = Instant::now();

        let outcome =
            tokio::time::timeout(self.config.case_timeout, self.agent.run(&case.input, &trace)).await;

        let (status, output) = match outcome {
            Ok(Ok(outcome)) => (
                CaseStatus::Completed {
                    termination: outcome.termination,
                    model_calls: outcome.model_calls,
                    rounds: outcome.rounds,
                },
                Some(outcome.answer),
            ),
            Ok(Err(e)) => {
                tracing::warn!(%case_id, index, error = %e, "Case errored");
                (
                    CaseStatus::Errored(CaseError::Agent {
                        message: e.to_string(),
                    }),
                    None,
                )
            }
            Err(_) => {
                let after_ms = self.config.case_timeout.as_millis() as u64;
                tracing::warn!(%case_id, index, after_ms, "Case timed out");
                (CaseStatus::Errored(CaseError::TimedOut { after_ms }), None)
            }
        };

        let mut scores = BTreeMap::new();
        if let Some(output) = &output {
            let input = ScorerInput {
                input: case.input.clone(),
                output: output.clone(),
                expected: case.expected.clone(),
                metadata: case.metadata.clone(),
                trace: trace.snapshot().await,
            };
            scores.extend(self.scorers.score_all(&input).await);
        }

        if !self.config.retain_traces {
            if let Err(e) = self.recorder.discard(case_id).await {
                tracing::warn!(%case_id, index, error = %e, "Failed to discard case trace");
            }
        }

        tracing::debug!(%case_id, index, completed = status.is_completed(), "Case finished");

        CaseReport {
            case_id,
            index,
            input: case.input,
            expected: case.expected,
            metadata: case.metadata,
            output,
            status,
            scores,
            duration: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(RunnerConfig::new().with_concurrency(0).concurrency, 1);
        assert_eq!(RunnerConfig::new().with_concurrency(8).concurrency, 8);
        assert_eq!(RunnerConfig::default().concurrency, DEFAULT_CONCURRENCY);
        assert!(!RunnerConfig::default().retain_traces);
    }
}
