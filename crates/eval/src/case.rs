// Eval cases and their metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata keys read by the built-in scorers
pub mod keys {
    pub const CATEGORY: &str = "category";
    pub const EXPECTED_TOOL: &str = "expected_tool";
    pub const EXPECTED_TOOL_PATH: &str = "expected_tool_path";
}

/// A metadata value: a string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
}

/// String-keyed case metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseMetadata(BTreeMap<String, MetadataValue>);

impl CaseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Text value of a key; `None` for lists
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::List(_) => None,
        }
    }

    /// List value of a key; a text value is a one-element list
    pub fn list(&self, key: &str) -> Option<Vec<&str>> {
        match self.0.get(key)? {
            MetadataValue::Text(s) => Some(vec![s.as_str()]),
            MetadataValue::List(items) => Some(items.iter().map(String::as_str).collect()),
        }
    }

    pub fn category(&self) -> Option<&str> {
        self.text(keys::CATEGORY)
    }

    pub fn expected_tool(&self) -> Option<&str> {
        self.text(keys::EXPECTED_TOOL)
    }

    pub fn expected_tool_path(&self) -> Option<Vec<&str>> {
        self.list(keys::EXPECTED_TOOL_PATH)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }
}

/// One dataset record: input, expected answer, metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub input: String,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub metadata: CaseMetadata,
}

impl EvalCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
            metadata: CaseMetadata::new(),
        }
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key, MetadataValue::Text(value.into()));
        self
    }

    pub fn with_list<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.insert(
            key,
            MetadataValue::List(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn with_category(self, category: &str) -> Self {
        self.with_text(keys::CATEGORY, category)
    }

    pub fn with_expected_tool(self, tool: &str) -> Self {
        self.with_text(keys::EXPECTED_TOOL, tool)
    }

    pub fn with_expected_tool_path<I, S>(self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_list(keys::EXPECTED_TOOL_PATH, path)
    }
}
