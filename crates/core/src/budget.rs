// Global model-call budget
//
// The only state shared between concurrently running cases. Every call through
// a BudgetedClient takes one unit; once the budget is spent, calls fail with
// LlmError::BudgetExhausted without reaching the inner client.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::llm::{BoxedLlmClient, Completion, LlmClient, LlmError};
use crate::message::ConversationMessage;
use crate::tool_types::ToolDefinition;

/// Atomic counter of model calls allowed across all cases
#[derive(Debug)]
pub struct ModelCallBudget {
    limit: usize,
    used: AtomicUsize,
}

impl ModelCallBudget {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            used: AtomicUsize::new(0),
        })
    }

    /// Take one unit; false when the budget is spent
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }
}

/// LLM client gated by a shared `ModelCallBudget`
#[derive(Clone)]
pub struct BudgetedClient {
    inner: BoxedLlmClient,
    budget: Arc<ModelCallBudget>,
}

impl BudgetedClient {
    pub fn new(inner: BoxedLlmClient, budget: Arc<ModelCallBudget>) -> Self {
        Self { inner, budget }
    }

    pub fn budget(&self) -> &Arc<ModelCallBudget> {
        &self.budget
    }
}

#[async_trait]
impl LlmClient for BudgetedClient {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError> {
        if !self.budget.try_acquire() {
            return Err(LlmError::BudgetExhausted(self.budget.limit()));
        }
        self.inner.complete(messages, tools).await
    }
}
