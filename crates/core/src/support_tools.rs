// Acme customer support tools
//
// lookup_order and search_faq are pure reads of the SupportStore.
// process_refund only succeeds for delivered orders; every other outcome is
// a tool error the model is expected to relay to the customer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::store::{FaqEntry, SupportStore};
use crate::tool_types::{ParamType, ParameterSchema, ToolId};
use crate::tools::{Tool, ToolExecutionResult, ToolRegistry};

fn string_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> &'a str {
    arguments.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn to_json_result<T: Serialize>(value: &T) -> ToolExecutionResult {
    match serde_json::to_string(value) {
        Ok(text) => ToolExecutionResult::success(text),
        Err(e) => ToolExecutionResult::internal_error(e),
    }
}

// ============================================================================
// lookup_order
// ============================================================================

pub struct LookupOrderTool {
    store: Arc<SupportStore>,
}

impl LookupOrderTool {
    pub fn new(store: Arc<SupportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LookupOrderTool {
    fn id(&self) -> ToolId {
        ToolId::LookupOrder
    }

    fn description(&self) -> &str {
        "Look up an order by its order ID. Returns order details including status, items, and total."
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new().required("order_id", ParamType::String, "The order ID, e.g. ORD-1001")
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolExecutionResult {
        let order_id = string_arg(arguments, "order_id");
        match self.store.order(order_id) {
            Some(order) => to_json_result(order),
            // Not an error: "not found" is a valid answer the model must relay
            None => ToolExecutionResult::success(format!("Order {} not found.", order_id)),
        }
    }
}

// ============================================================================
// process_refund
// ============================================================================

pub struct ProcessRefundTool {
    store: Arc<SupportStore>,
}

impl ProcessRefundTool {
    pub fn new(store: Arc<SupportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ProcessRefundTool {
    fn id(&self) -> ToolId {
        ToolId::ProcessRefund
    }

    fn description(&self) -> &str {
        "Process a refund for an order. Only delivered orders are eligible."
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("order_id", ParamType::String, "The order ID to refund")
            .required("reason", ParamType::String, "Reason for the refund")
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolExecutionResult {
        let order_id = string_arg(arguments, "order_id");
        let reason = string_arg(arguments, "reason");

        let Some(order) = self.store.order(order_id) else {
            return ToolExecutionResult::tool_error(format!("Error: Order {} not found.", order_id));
        };
        if !order.status.is_refundable() {
            return ToolExecutionResult::tool_error(format!(
                "Error: Order {} is '{}' and is not eligible for a refund. Only delivered orders can be refunded.",
                order_id, order.status
            ));
        }

        ToolExecutionResult::success(format!(
            "Refund of ${:.2} for order {} has been processed. Reason: {}",
            order.total, order_id, reason
        ))
    }
}

// ============================================================================
// search_faq
// ============================================================================

pub struct SearchFaqTool {
    store: Arc<SupportStore>,
}

impl SearchFaqTool {
    pub fn new(store: Arc<SupportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchFaqTool {
    fn id(&self) -> ToolId {
        ToolId::SearchFaq
    }

    fn description(&self) -> &str {
        "Search the FAQ knowledge base for product questions about billing, accounts, features, etc."
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new().required("query", ParamType::String, "The search query")
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolExecutionResult {
        match self.store.search_faq(string_arg(arguments, "query")) {
            Some(faq) => to_json_result(faq),
            None => to_json_result(&FaqEntry::no_match()),
        }
    }
}

/// Registry with all three support tools over one shared store
pub fn support_registry(store: Arc<SupportStore>) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::builder()
        .tool(LookupOrderTool::new(store.clone()))
        .tool(ProcessRefundTool::new(store.clone()))
        .tool(SearchFaqTool::new(store))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn store() -> Arc<SupportStore> {
        Arc::new(SupportStore::acme())
    }

    fn text(result: ToolExecutionResult) -> (bool, String) {
        match result {
            ToolExecutionResult::Success(t) => (true, t),
            ToolExecutionResult::ToolError(t) => (false, t),
            ToolExecutionResult::InternalError(e) => panic!("unexpected internal error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_order_found() {
        let tool = LookupOrderTool::new(store());
        let (ok, out) = text(tool.execute(&args(json!({"order_id": "ORD-1001"}))).await);
        assert!(ok);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["order_id"], "ORD-1001");
        assert_eq!(value["status"], "delivered");
        assert_eq!(value["items"], json!(["Pro Plan (Annual)"]));
        assert_eq!(value["total"], 299.99);
        assert_eq!(value["date"], "2025-01-15");
    }

    #[tokio::test]
    async fn test_lookup_order_not_found() {
        let tool = LookupOrderTool::new(store());
        let (ok, out) = text(tool.execute(&args(json!({"order_id": "ORD-9999"}))).await);
        assert!(ok);
        assert_eq!(out, "Order ORD-9999 not found.");
    }

    #[tokio::test]
    async fn test_refund_delivered_order() {
        let tool = ProcessRefundTool::new(store());
        let (ok, out) = text(
            tool.execute(&args(json!({"order_id": "ORD-1001", "reason": "No longer needed"})))
                .await,
        );
        assert!(ok);
        assert_eq!(
            out,
            "Refund of $299.99 for order ORD-1001 has been processed. Reason: No longer needed"
        );
    }

    #[tokio::test]
    async fn test_refund_ineligible_and_missing() {
        let tool = ProcessRefundTool::new(store());

        let (ok, out) = text(
            tool.execute(&args(json!({"order_id": "ORD-1002", "reason": "x"})))
                .await,
        );
        assert!(!ok);
        assert_eq!(
            out,
            "Error: Order ORD-1002 is 'shipped' and is not eligible for a refund. Only delivered orders can be refunded."
        );

        let (ok, out) = text(
            tool.execute(&args(json!({"order_id": "ORD-0000", "reason": "x"})))
                .await,
        );
        assert!(!ok);
        assert_eq!(out, "Error: Order ORD-0000 not found.");
    }

    #[tokio::test]
    async fn test_search_faq() {
        let tool = SearchFaqTool::new(store());

        let (_, out) = text(tool.execute(&args(json!({"query": "free trial"}))).await);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["question"], "Do you offer a free trial?");

        let (ok, out) = text(tool.execute(&args(json!({"query": "Slack integration"}))).await);
        assert!(ok);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["question"], "No match");
        assert!(value["answer"].as_str().unwrap().contains("support@acme.com"));
    }

    #[test]
    fn test_support_registry() {
        let registry = support_registry(store()).unwrap();
        assert_eq!(
            registry.tool_ids(),
            vec![ToolId::LookupOrder, ToolId::ProcessRefund, ToolId::SearchFaq]
        );
        let refund = &registry.tool_definitions()[1];
        assert_eq!(refund.parameters["required"], json!(["order_id", "reason"]));
    }
}
