//! Monthly aggregation
//!
//! Groups normalized expenses into (year, month, category) buckets and
//! renders one summary document per bucket.

use crate::models::{
    format_amount, round2, DocumentMetadata, ExpenseDocument, NormalizedExpense, UserShares,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How expenses are assigned to summary buckets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPolicy {
    /// Bucket by (year, month, category).
    #[default]
    CalendarMonth,
    /// Bucket by (month name, category) only; the bucket's year is the most
    /// common year among its members. Same-named months of different years
    /// merge. Kept for compatibility with summaries produced by earlier
    /// releases.
    MonthName,
}

/// One aggregation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryBucket {
    pub year: i32,
    pub month: String,
    pub category: String,
    pub total_cost: f64,
    pub currency: String,
    pub shares: UserShares,
    pub expense_count: usize,
}

impl SummaryBucket {
    pub fn render(&self) -> String {
        format!(
            "Summary total for month is {} {} || User expenses: {}",
            format_amount(self.total_cost),
            self.currency,
            self.shares
        )
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata::Summary {
            month: self.month.clone(),
            year: self.year.to_string(),
            category: self.category.clone(),
        }
    }

    pub fn to_document(&self) -> ExpenseDocument {
        ExpenseDocument {
            body: self.render(),
            metadata: self.metadata(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketKey {
    year: Option<i32>,
    month: String,
    category: String,
}

impl BucketKey {
    fn for_expense(expense: &NormalizedExpense, policy: GroupingPolicy) -> Self {
        Self {
            year: match policy {
                GroupingPolicy::CalendarMonth => Some(expense.year),
                GroupingPolicy::MonthName => None,
            },
            month: expense.month.clone(),
            category: expense.category.clone(),
        }
    }

    fn same_month(&self, other: &BucketKey) -> bool {
        self.year == other.year && self.month == other.month
    }
}

/// Group expenses and compute per-bucket totals.
///
/// Buckets come out in order of first appearance of their month, then of
/// their category within that month.
pub fn summarize(expenses: &[NormalizedExpense], policy: GroupingPolicy) -> Vec<SummaryBucket> {
    // (key, member indices), in first-appearance order
    let mut groups: Vec<(BucketKey, Vec<usize>)> = Vec::new();

    for (idx, expense) in expenses.iter().enumerate() {
        let key = BucketKey::for_expense(expense, policy);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(idx),
            None => groups.push((key, vec![idx])),
        }
    }

    let mut month_order: Vec<BucketKey> = Vec::new();
    for (key, _) in &groups {
        if !month_order.iter().any(|k| k.same_month(key)) {
            month_order.push(key.clone());
        }
    }

    let mut buckets = Vec::with_capacity(groups.len());
    for month_key in &month_order {
        for (key, members) in groups.iter().filter(|(k, _)| k.same_month(month_key)) {
            let members: Vec<&NormalizedExpense> = members.iter().map(|&i| &expenses[i]).collect();
            buckets.push(build_bucket(key, &members));
        }
    }

    buckets
}

fn build_bucket(key: &BucketKey, members: &[&NormalizedExpense]) -> SummaryBucket {
    let total_cost = round2(members.iter().map(|e| e.cost).sum::<f64>());
    let currency = mode(members.iter().map(|e| e.currency.clone())).unwrap_or_default();
    let year = match key.year {
        Some(year) => year,
        None => mode(members.iter().map(|e| e.year)).unwrap_or_default(),
    };

    SummaryBucket {
        year,
        month: key.month.clone(),
        category: key.category.clone(),
        total_cost,
        currency,
        shares: sum_shares(members),
        expense_count: members.len(),
    }
}

/// Sum per-user shares across expenses. Inputs are already rounded to cents;
/// the sums are rounded again.
pub fn sum_shares(members: &[&NormalizedExpense]) -> UserShares {
    let mut totals = UserShares::new();

    for expense in members {
        for (name, share) in expense.shares.iter() {
            match totals.get_mut(name) {
                Some(total) => {
                    total.owed_share += share.owed_share;
                    total.paid_share += share.paid_share;
                }
                None => totals.insert(name, *share),
            }
        }
    }

    let mut rounded = UserShares::new();
    for (name, share) in totals.iter() {
        let mut share = *share;
        share.owed_share = round2(share.owed_share);
        share.paid_share = round2(share.paid_share);
        rounded.insert(name, share);
    }
    rounded
}

/// Most frequent value; ties go to the smallest value.
fn mode<T: Ord>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in counts {
        match &best {
            Some((_, best_count)) if *best_count >= count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(v, _)| v)
}

pub fn to_documents(buckets: &[SummaryBucket]) -> Vec<ExpenseDocument> {
    buckets.iter().map(SummaryBucket::to_document).collect()
}
