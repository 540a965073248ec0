//! Shared fixtures and fakes for unit tests.

use crate::error::LedgerChatError;
use crate::ledger::LedgerClient;
use crate::llm::{LanguageModel, Message, ToolSpec};
use crate::models::{DecimalString, RawCategory, RawExpense, RawShare, RawUser};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Five expenses across October and November 2024, two categories.
pub fn synthetic_expenses() -> Vec<RawExpense> {
    let records = json!([
        {
            "description": "Dining Out",
            "category": {"name": "Dining out"},
            "cost": 25.50,
            "currency_code": "GBP",
            "date": "2024-10-05T18:30:00Z",
            "users": [
                {"user": {"first_name": "Alice", "last_name": "Z"}, "user_id": 1, "paid_share": "25.50", "owed_share": "25.50"}
            ]
        },
        {
            "description": "Groceries",
            "category": {"name": "Groceries"},
            "cost": 45.75,
            "currency_code": "GBP",
            "date": "2024-10-10T14:20:00Z",
            "users": [
                {"user": {"first_name": "Bob", "last_name": "X"}, "user_id": 2, "paid_share": "45.75", "owed_share": "0"},
                {"user": {"first_name": "Alice", "last_name": "Z"}, "user_id": 1, "paid_share": 0, "owed_share": "45.75"}
            ]
        },
        {
            "description": "Dining Out 2",
            "category": {"name": "Dining out"},
            "cost": 30.00,
            "currency_code": "GBP",
            "date": "2024-10-15T19:00:00Z",
            "users": [
                {"user": {"first_name": "Alice", "last_name": "Z"}, "user_id": 1, "paid_share": "30.00", "owed_share": "30.00"}
            ]
        },
        {
            "description": "Groceries 2",
            "category": {"name": "Groceries"},
            "cost": 10.20,
            "currency_code": "GBP",
            "date": "2024-11-01T12:45:00Z",
            "users": [
                {"user": {"first_name": "Bob", "last_name": "X"}, "user_id": 2, "paid_share": "10.20", "owed_share": "5.10"},
                {"user": {"first_name": "Alice", "last_name": "Z"}, "user_id": 1, "paid_share": "0", "owed_share": "5.10"}
            ]
        },
        {
            "description": "Dining Out",
            "category": {"name": "Dining out"},
            "cost": 20.00,
            "currency_code": "GBP",
            "date": "2024-11-05T18:15:00Z",
            "users": [
                {"user": {"first_name": "Bob", "last_name": "X"}, "user_id": 2, "paid_share": "20.00", "owed_share": "20.00"}
            ]
        }
    ]);

    serde_json::from_value(records).expect("synthetic fixture must deserialize")
}

/// Build one raw record. Shares are `(first_name, last_name, paid, owed)`.
pub fn raw_expense(
    description: &str,
    category: &str,
    cost: &str,
    date: &str,
    shares: &[(&str, Option<&str>, &str, &str)],
) -> RawExpense {
    RawExpense {
        id: None,
        description: description.to_string(),
        cost: DecimalString::new(cost),
        currency_code: "GBP".to_string(),
        category: RawCategory {
            id: None,
            name: category.to_string(),
        },
        date: date.to_string(),
        users: shares
            .iter()
            .map(|(first, last, paid, owed)| RawShare {
                user: RawUser {
                    id: None,
                    first_name: first.to_string(),
                    last_name: last.map(str::to_string),
                },
                user_id: None,
                paid_share: DecimalString::new(*paid),
                owed_share: DecimalString::new(*owed),
            })
            .collect(),
    }
}

type Responder = dyn Fn(&[Message], &[ToolSpec]) -> Result<Message> + Send + Sync;

/// Language model driven by a closure. Every request is recorded.
pub struct FnModel {
    responder: Box<Responder>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl FnModel {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&[Message], &[ToolSpec]) -> Result<Message> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        self.requests.lock().unwrap().push(messages.to_vec());
        (self.responder)(messages, tools)
    }
}

#[async_trait]
impl LanguageModel for FnModel {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        self.respond(messages, &[])
    }

    async fn invoke_with_tools(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        self.respond(messages, tools)
    }
}

/// Ledger backed by fixed per-group record lists.
#[derive(Default)]
pub struct StaticLedger {
    groups: HashMap<u64, (String, Vec<RawExpense>)>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group_id: u64, name: &str, records: Vec<RawExpense>) -> Self {
        self.groups.insert(group_id, (name.to_string(), records));
        self
    }
}

#[async_trait]
impl LedgerClient for StaticLedger {
    async fn fetch_expenses(&self, group_id: u64) -> Result<Vec<RawExpense>> {
        self.groups
            .get(&group_id)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| LedgerChatError::AuthError(format!("No access to group {}", group_id)))
    }

    async fn fetch_group(&self, group_id: u64) -> Result<String> {
        self.groups
            .get(&group_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| LedgerChatError::AuthError(format!("No access to group {}", group_id)))
    }
}
