// Agent configuration for the conversation loop
//
// Model selection lives on the LLM client; this struct only carries what the
// loop itself needs.

use serde::{Deserialize, Serialize};

/// System prompt of the Acme Corp support agent
pub const SUPPORT_SYSTEM_PROMPT: &str = "You are a helpful customer support agent for Acme Corp, a project management SaaS product.
Use the provided tools to help customers with their questions. Be concise and friendly.
If a tool returns an error, relay that information honestly to the customer. Do not make up information.";

/// Configuration for the conversation loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt seeded as the first message
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool-calling rounds before tools are withdrawn for a final answer
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_system_prompt() -> String {
    SUPPORT_SYSTEM_PROMPT.to_string()
}

fn default_max_rounds() -> usize {
    3
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_rounds: default_max_rounds(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(SUPPORT_SYSTEM_PROMPT)
    }
}
