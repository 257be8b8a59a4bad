use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A company listed in the roster file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Line of the roster file the entry was read from
    pub line: u64,
    pub display_name: String,
    pub api_credential: String,
    pub output_folder: String,
}

/// Half-open interval of epoch seconds: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Balance transaction as returned by the processor
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub created: i64,
    /// Gross amount in minor units
    pub amount: i64,
    /// Processing fee in minor units
    pub fee: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl Transaction {
    pub fn metadata_value(&self, key: &str) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One page of a list response
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransactionPage {
    pub data: Vec<Transaction>,
    #[serde(default)]
    pub has_more: bool,
}

/// Header written at the top of every export file
pub const OUTPUT_HEADER: [&str; 7] = [
    "DATE",
    "Amount",
    "Description",
    "Reference",
    "Type",
    "Email (meta)",
    "Name (meta)",
];

/// A single line of an export file, in header order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub date: String,
    pub amount: Decimal,
    pub description: String,
    pub reference: String,
    pub transaction_type: String,
    pub email: String,
    pub name: String,
}
