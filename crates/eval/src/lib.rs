// Trace-based evaluation of the support agent
//
// Runs the conversation loop over a dataset of cases and scores each case
// from its recorded trace: which tools ran, in what order, with what output.
//
// Key design decisions:
// - Scorers read an immutable CaseTrace snapshot, never the live recorder
// - Not-applicable is its own score variant and is excluded from aggregates
// - A failing or panicking scorer only fails its own entry
// - Errored cases (timeouts, loop errors) are reported, not scored as zero

pub mod case;
pub mod dataset;
pub mod judge;
pub mod results;
pub mod runner;
pub mod scorer;
pub mod scorers;

pub use case::{CaseMetadata, EvalCase, MetadataValue};
pub use dataset::{
    workshop_cases, workshop_dataset, Dataset, DatasetError, JsonFileDataset, VecDataset,
    WORKSHOP_DATASET,
};
pub use judge::{Applicability, JudgeScorer, JudgeSpec};
pub use results::{CaseError, CaseReport, CaseStatus, EvalSummary, ScorerSummary};
pub use runner::{EvalError, EvalProgress, EvalRunner, RunnerConfig};
pub use scorer::{ScoreResult, ScoreValue, Scorer, ScorerEntry, ScorerError, ScorerInput, Scorers};
pub use scorers::{
    CorrectToolUsed, ExpectedToolPath, KeywordMatch, NoHallucinationOnMissingOrder, PathMatch,
};

/// The deterministic scorers, with `expected_tool_path` in `mode`
pub fn code_scorers(mode: PathMatch) -> Scorers {
    Scorers::new()
        .add(KeywordMatch)
        .add(CorrectToolUsed)
        .add(NoHallucinationOnMissingOrder)
        .add(ExpectedToolPath::new(mode))
}
