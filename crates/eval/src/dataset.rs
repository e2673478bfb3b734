//! Dataset loading.
//!
//! A dataset is an ordered list of [`EvalCase`]s. The workshop cases are built
//! in; other datasets load from a JSON array on disk.

use crate::case::EvalCase;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid case at index {index}: {reason}")]
    InvalidCase { index: usize, reason: String },
}

/// Source of eval cases
#[async_trait]
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;

    /// Load cases in dataset order, truncated to `sample_size` when given
    async fn load(&self, sample_size: Option<usize>) -> Result<Vec<EvalCase>, DatasetError>;
}

fn validate(cases: &[EvalCase]) -> Result<(), DatasetError> {
    for (index, case) in cases.iter().enumerate() {
        if case.input.trim().is_empty() {
            return Err(DatasetError::InvalidCase {
                index,
                reason: "input is empty".to_string(),
            });
        }
    }
    Ok(())
}

fn sample(mut cases: Vec<EvalCase>, sample_size: Option<usize>) -> Vec<EvalCase> {
    if let Some(n) = sample_size {
        cases.truncate(n);
    }
    cases
}

/// Dataset held in memory
#[derive(Debug, Clone)]
pub struct VecDataset {
    name: String,
    cases: Vec<EvalCase>,
}

impl VecDataset {
    pub fn new(name: impl Into<String>, cases: Vec<EvalCase>) -> Self {
        Self {
            name: name.into(),
            cases,
        }
    }

    pub fn cases(&self) -> &[EvalCase] {
        &self.cases
    }
}

#[async_trait]
impl Dataset for VecDataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, sample_size: Option<usize>) -> Result<Vec<EvalCase>, DatasetError> {
        validate(&self.cases)?;
        Ok(sample(self.cases.clone(), sample_size))
    }
}

/// Dataset read from a JSON array of cases
///
/// ```json
/// [
///   {"input": "...", "expected": "...", "metadata": {"category": "faq"}}
/// ]
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileDataset {
    path: PathBuf,
    name: String,
}

impl JsonFileDataset {
    /// Name defaults to the file stem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset")
            .to_string();
        Self { path, name }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Dataset for JsonFileDataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, sample_size: Option<usize>) -> Result<Vec<EvalCase>, DatasetError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let cases: Vec<EvalCase> = serde_json::from_str(&content)
            .map_err(|e| DatasetError::Parse(format!("{}: {}", self.path.display(), e)))?;
        validate(&cases)?;
        tracing::debug!(path = %self.path.display(), count = cases.len(), "Loaded dataset");
        Ok(sample(cases, sample_size))
    }
}

/// Name of the built-in dataset
pub const WORKSHOP_DATASET: &str = "support-agent-dataset";

/// The built-in dataset as a [`Dataset`]
pub fn workshop_dataset() -> VecDataset {
    VecDataset::new(WORKSHOP_DATASET, workshop_cases())
}

/// The twelve Acme support cases
///
/// Each case names the one tool it needs. None carries an
/// `expected_tool_path`, so path scoring is not applicable here.
pub fn workshop_cases() -> Vec<EvalCase> {
    let case = |input: &str, expected: &str, category: &str, tool: &str| {
        EvalCase::new(input, expected)
            .with_category(category)
            .with_expected_tool(tool)
    };

    vec![
        case(
            "What's the status of order ORD-1001?",
            "Order ORD-1001 has been delivered. It contains Pro Plan (Annual) and the total was $299.99.",
            "order_lookup",
            "lookup_order",
        ),
        case(
            "Can you tell me about order ORD-1004?",
            "Order ORD-1004 has been delivered. Items: Pro Plan (Monthly) and Storage Upgrade. Total: $74.98.",
            "order_lookup",
            "lookup_order",
        ),
        case(
            "I'd like a refund for order ORD-1001, the product didn't meet my expectations.",
            "Refund of $299.99 for order ORD-1001 has been processed.",
            "refund",
            "process_refund",
        ),
        case(
            "How do I reset my password?",
            "Go to Settings > Security > Reset Password. You'll receive an email with a reset link.",
            "faq",
            "search_faq",
        ),
        case(
            "What payment methods do you accept?",
            "We accept Visa, Mastercard, American Express, and PayPal.",
            "faq",
            "search_faq",
        ),
        case(
            "What's the status of order ORD-9999?",
            "Order ORD-9999 was not found. Please double-check your order ID or contact support.",
            "order_not_found",
            "lookup_order",
        ),
        case(
            "Tell me about order ORD-0000",
            "That order could not be found in our system.",
            "order_not_found",
            "lookup_order",
        ),
        case(
            "Do you offer a free trial?",
            "Yes! All plans include a 14-day free trial. No credit card required.",
            "faq",
            "search_faq",
        ),
        case(
            "How do I cancel my subscription?",
            "Go to Settings > Billing > Cancel Subscription. Your access continues until the end of your billing period.",
            "faq",
            "search_faq",
        ),
        case(
            "I want a refund for order ORD-1002",
            "Order ORD-1002 is currently shipped and is not eligible for a refund. Only delivered orders can be refunded.",
            "refund_ineligible",
            "process_refund",
        ),
        case(
            "Please refund order ORD-1003, I changed my mind.",
            "Order ORD-1003 is still processing and cannot be refunded yet. Only delivered orders are eligible.",
            "refund_ineligible",
            "process_refund",
        ),
        case(
            "Can I integrate Acme with Slack?",
            "I don't have information about Slack integration. Please contact support@acme.com for help.",
            "faq_no_match",
            "search_faq",
        ),
    ]
}
