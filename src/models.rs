//! Core data models for the ledger chat assistant

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

//
// ================= Raw ledger records =================
//

/// Decimal amount as delivered by the ledger service.
///
/// The service sends amounts as strings (`"25.50"`) but older exports and
/// hand-written fixtures carry plain JSON numbers, so both are accepted and
/// kept verbatim until normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DecimalString(pub String);

impl DecimalString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a float. Returns `None` for anything that is not a finite number.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl<'de> Deserialize<'de> for DecimalString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(s) => DecimalString(s),
            Repr::Number(n) => DecimalString(n.to_string()),
        })
    }
}

impl From<&str> for DecimalString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawCategory {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawUser {
    #[serde(default)]
    pub id: Option<u64>,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// One participant's share of an expense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawShare {
    pub user: RawUser,
    #[serde(default)]
    pub user_id: Option<u64>,
    pub paid_share: DecimalString,
    pub owed_share: DecimalString,
}

/// Expense record as returned by the ledger service. Never mutated after fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawExpense {
    #[serde(default)]
    pub id: Option<u64>,
    pub description: String,
    pub cost: DecimalString,
    pub currency_code: String,
    pub category: RawCategory,
    /// ISO-8601 timestamp, e.g. `2024-10-05T18:30:00Z`
    pub date: String,
    pub users: Vec<RawShare>,
}

//
// ================= Normalized records =================
//

/// Owed and paid amounts for one user, rounded to cents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct UserShare {
    pub owed_share: f64,
    pub paid_share: f64,
}

/// Display name → share mapping that keeps first-insertion order.
///
/// Inserting an existing name overwrites its share in place, which is how
/// display-name collisions inside a single record resolve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserShares {
    entries: Vec<(String, UserShare)>,
}

impl UserShares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, share: UserShare) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = share,
            None => self.entries.push((name, share)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&UserShare> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UserShare> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserShare)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for UserShares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, share)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "'{}': {{'owed_share': {}, 'paid_share': {}}}",
                name,
                format_amount(share.owed_share),
                format_amount(share.paid_share)
            )?;
        }
        write!(f, "}}")
    }
}

/// Expense after cleaning. Built once per fetch and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedExpense {
    pub description: String,
    pub cost: f64,
    pub currency: String,
    /// Lower-cased category name
    pub category: String,
    pub day: u32,
    /// English month name, e.g. `October`
    pub month: String,
    pub year: i32,
    pub shares: UserShares,
}

//
// ================= Documents =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Individual,
    Summary,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Individual => "individual",
            DocumentType::Summary => "summary",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata tag attached to every document. Each variant carries only the
/// fields that exist for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentMetadata {
    Individual {
        day: u32,
        month: String,
        year: i32,
        category: String,
    },
    Summary {
        month: String,
        /// Stored as text, as the ledger summaries always have been
        year: String,
        category: String,
    },
}

impl DocumentMetadata {
    pub fn doc_type(&self) -> DocumentType {
        match self {
            DocumentMetadata::Individual { .. } => DocumentType::Individual,
            DocumentMetadata::Summary { .. } => DocumentType::Summary,
        }
    }

    /// Look up a metadata attribute by its schema name.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match (self, name) {
            (_, "type") => Some(FieldValue::Text(self.doc_type().as_str().to_string())),
            (DocumentMetadata::Individual { day, .. }, "day") => Some(FieldValue::Int(*day as i64)),
            (DocumentMetadata::Individual { month, .. }, "month")
            | (DocumentMetadata::Summary { month, .. }, "month") => {
                Some(FieldValue::Text(month.clone()))
            }
            (DocumentMetadata::Individual { year, .. }, "year") => Some(FieldValue::Int(*year as i64)),
            (DocumentMetadata::Summary { year, .. }, "year") => Some(FieldValue::Text(year.clone())),
            (DocumentMetadata::Individual { category, .. }, "category")
            | (DocumentMetadata::Summary { category, .. }, "category") => {
                Some(FieldValue::Text(category.clone()))
            }
            _ => None,
        }
    }
}

/// A retrievable unit: rendered text plus its metadata tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseDocument {
    pub body: String,
    pub metadata: DocumentMetadata,
}

impl ExpenseDocument {
    pub fn doc_type(&self) -> DocumentType {
        self.metadata.doc_type()
    }

    /// Render as a `Source` / `Content` block for prompts.
    pub fn to_source_block(&self) -> String {
        let source = serde_json::to_string(&self.metadata).unwrap_or_default();
        format!("Source: {}\nContent: {}", source, self.body)
    }
}

//
// ================= Metadata values =================
//

/// Scalar metadata value used by filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Compare two values. Numbers (and numeric strings) compare numerically,
    /// everything else compares as case-insensitive text.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_int(), other.as_int()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
            _ => None,
        }
    }

    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format an amount so it always shows a decimal point (`55.5`, `0.0`).
pub fn format_amount(value: f64) -> String {
    format!("{:?}", value)
}
