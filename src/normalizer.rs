//! Record normalization
//!
//! Turns raw ledger records into cleaned expenses and renders each one as a
//! human-readable document. Settlement entries are not expenses and are
//! dropped here.

use crate::error::LedgerChatError;
use crate::models::{
    format_amount, round2, DecimalString, DocumentMetadata, ExpenseDocument, NormalizedExpense,
    RawExpense, RawShare, RawUser, UserShare, UserShares,
};
use crate::Result;
use chrono::{DateTime, Datelike, Month};
use tracing::debug;

/// Description the ledger service gives to balance settlements.
pub const SETTLEMENT_MARKER: &str = "Settle all balances";

/// Normalize a batch of raw records.
///
/// A record that cannot be parsed fails the whole batch: a partial corpus
/// would produce misleading monthly totals.
pub fn normalize(raw: &[RawExpense]) -> Result<Vec<NormalizedExpense>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut settlements = 0usize;

    for record in raw {
        if is_settlement(record) {
            settlements += 1;
            continue;
        }
        out.push(normalize_record(record)?);
    }

    debug!(
        input = raw.len(),
        normalized = out.len(),
        settlements,
        "Normalized ledger records"
    );

    Ok(out)
}

pub fn is_settlement(record: &RawExpense) -> bool {
    record.description == SETTLEMENT_MARKER
}

fn normalize_record(record: &RawExpense) -> Result<NormalizedExpense> {
    let label = record_label(record);

    let date = DateTime::parse_from_rfc3339(record.date.trim()).map_err(|e| {
        LedgerChatError::MalformedRecord(format!("{}: invalid date '{}': {}", label, record.date, e))
    })?;

    let month = Month::try_from(date.month() as u8)
        .map(|m| m.name().to_string())
        .map_err(|_| {
            LedgerChatError::MalformedRecord(format!("{}: invalid month in '{}'", label, record.date))
        })?;

    let cost = parse_amount(&record.cost, &label, "cost")?;

    let mut shares = UserShares::new();
    for participant in &record.users {
        let (name, share) = normalize_share(participant, &label)?;
        shares.insert(name, share);
    }

    Ok(NormalizedExpense {
        description: record.description.clone(),
        cost,
        currency: record.currency_code.clone(),
        category: record.category.name.to_lowercase(),
        day: date.day(),
        month,
        year: date.year(),
        shares,
    })
}

fn normalize_share(share: &RawShare, label: &str) -> Result<(String, UserShare)> {
    let name = display_name(&share.user);
    let owed_share = round2(parse_amount(&share.owed_share, label, "owed_share")?);
    let paid_share = round2(parse_amount(&share.paid_share, label, "paid_share")?);
    Ok((name, UserShare { owed_share, paid_share }))
}

/// `"{first} {last}"` when a last name is present, otherwise the first name.
pub fn display_name(user: &RawUser) -> String {
    match user.last_name.as_deref().map(str::trim) {
        Some(last) if !last.is_empty() => format!("{} {}", user.first_name, last),
        _ => user.first_name.clone(),
    }
}

fn parse_amount(value: &DecimalString, label: &str, field: &str) -> Result<f64> {
    value.to_f64().ok_or_else(|| {
        LedgerChatError::MalformedRecord(format!(
            "{}: {} '{}' is not a number",
            label,
            field,
            value.as_str()
        ))
    })
}

fn record_label(record: &RawExpense) -> String {
    match record.id {
        Some(id) => format!("expense {}", id),
        None => format!("expense '{}'", record.description),
    }
}

/// Pipe-delimited text body for a single expense.
pub fn render_individual(expense: &NormalizedExpense) -> String {
    format!(
        "Description: {} || Total cost of item: {} {} || Users: {}",
        expense.description,
        format_amount(expense.cost),
        expense.currency,
        expense.shares
    )
}

pub fn individual_metadata(expense: &NormalizedExpense) -> DocumentMetadata {
    DocumentMetadata::Individual {
        day: expense.day,
        month: expense.month.clone(),
        year: expense.year,
        category: expense.category.clone(),
    }
}

pub fn to_document(expense: &NormalizedExpense) -> ExpenseDocument {
    ExpenseDocument {
        body: render_individual(expense),
        metadata: individual_metadata(expense),
    }
}
