// Acme support data store
//
// Static order and FAQ fixtures backing the support tools. Read-only: a
// processed refund does not change the order, so every case sees the same data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fulfilment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Delivered,
    Shipped,
    Processing,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Delivered => "delivered",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Processing => "processing",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Only delivered orders can be refunded
    pub fn is_refundable(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as returned by `lookup_order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub status: OrderStatus,
    pub items: Vec<String>,
    pub total: f64,
    pub date: NaiveDate,
}

/// A knowledge base entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

impl FaqEntry {
    fn new(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    /// Entry returned when no question matches the query
    pub fn no_match() -> Self {
        Self::new(
            "No match",
            "I couldn't find a relevant FAQ entry. Please contact support@acme.com.",
        )
    }
}

/// Orders keyed by id plus an ordered FAQ list
#[derive(Debug, Clone, Default)]
pub struct SupportStore {
    orders: BTreeMap<String, OrderRecord>,
    faqs: Vec<FaqEntry>,
}

impl SupportStore {
    pub fn new(orders: Vec<OrderRecord>, faqs: Vec<FaqEntry>) -> Self {
        Self {
            orders: orders
                .into_iter()
                .map(|o| (o.order_id.clone(), o))
                .collect(),
            faqs,
        }
    }

    /// The Acme Corp fixture data
    pub fn acme() -> Self {
        let order = |id: &str, status, items: &[&str], total, (y, m, d)| OrderRecord {
            order_id: id.to_string(),
            status,
            items: items.iter().map(|s| s.to_string()).collect(),
            total,
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default(),
        };

        Self::new(
            vec![
                order("ORD-1001", OrderStatus::Delivered, &["Pro Plan (Annual)"], 299.99, (2025, 1, 15)),
                order("ORD-1002", OrderStatus::Shipped, &["Team Plan (Monthly)"], 49.99, (2025, 2, 1)),
                order("ORD-1003", OrderStatus::Processing, &["Enterprise Add-on"], 999.00, (2025, 2, 10)),
                order(
                    "ORD-1004",
                    OrderStatus::Delivered,
                    &["Pro Plan (Monthly)", "Storage Upgrade"],
                    74.98,
                    (2024, 12, 20),
                ),
                order("ORD-1005", OrderStatus::Cancelled, &["Starter Plan"], 0.00, (2025, 1, 5)),
            ],
            vec![
                FaqEntry::new(
                    "How do I reset my password?",
                    "Go to Settings > Security > Reset Password. You'll receive an email with a reset link.",
                ),
                FaqEntry::new(
                    "What payment methods do you accept?",
                    "We accept Visa, Mastercard, American Express, and PayPal.",
                ),
                FaqEntry::new(
                    "How do I cancel my subscription?",
                    "Go to Settings > Billing > Cancel Subscription. Your access continues until the end of your billing period.",
                ),
                FaqEntry::new(
                    "What is your refund policy?",
                    "We offer full refunds on delivered orders within 30 days. Orders that are shipped or processing cannot be refunded until delivered.",
                ),
                FaqEntry::new(
                    "How do I contact support?",
                    "Email support@acme.com or use the chat widget in the bottom-right corner of the app.",
                ),
                FaqEntry::new(
                    "Do you offer a free trial?",
                    "Yes! All plans include a 14-day free trial. No credit card required.",
                ),
            ],
        )
    }

    pub fn order(&self, order_id: &str) -> Option<&OrderRecord> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders.values()
    }

    pub fn faqs(&self) -> &[FaqEntry] {
        &self.faqs
    }

    /// First FAQ whose question contains any query word longer than three
    /// characters, compared case-insensitively.
    pub fn search_faq(&self, query: &str) -> Option<&FaqEntry> {
        let query = query.to_lowercase();
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.chars().count() > 3)
            .collect();
        if words.is_empty() {
            return None;
        }
        self.faqs.iter().find(|faq| {
            let question = faq.question.to_lowercase();
            words.iter().any(|w| question.contains(w))
        })
    }
}
