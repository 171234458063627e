use async_trait::async_trait;
use serde_json::{Map, Value};
use time::{Date, Month, OffsetDateTime, Time};
use tracing::warn;

use super::repo_types::{Category, Expense};
use crate::error::GatewayError;
use crate::subscription::Subscription;

/// Document store access for expenses, scoped to the signed-in principal.
#[async_trait]
pub trait ExpenseGateway: Send + Sync {
    /// Stamps owner and audit timestamps, returns the new id.
    async fn create_expense(&self, expense: Expense) -> Result<String, GatewayError>;

    /// Overwrites the document at `expense.id`.
    async fn update_expense(&self, expense: Expense) -> Result<(), GatewayError>;

    /// Deleting an absent document is not an error.
    async fn delete_expense(&self, id: &str) -> Result<(), GatewayError>;

    /// Every expense of the signed-in user, newest first.
    fn subscribe_all_expenses(&self) -> Subscription<Vec<Expense>>;

    /// Expenses dated inside `month_range(month, year)`, newest first.
    fn subscribe_expenses_by_month(&self, month: Month, year: i32) -> Subscription<Vec<Expense>>;

    fn subscribe_expenses_by_category(&self, category: Category) -> Subscription<Vec<Expense>>;
}

/// Inclusive bounds of a calendar month in UTC: first and last instant.
pub fn month_range(
    month: Month,
    year: i32,
) -> Result<(OffsetDateTime, OffsetDateTime), time::error::ComponentRange> {
    let first = Date::from_calendar_date(year, month, 1)?;
    let last_day = month.length(year);
    let last = Date::from_calendar_date(year, month, last_day)?;
    let end_of_day = Time::from_hms_nano(23, 59, 59, 999_999_999)?;
    Ok((
        first.midnight().assume_utc(),
        last.with_time(end_of_day).assume_utc(),
    ))
}

/// Decodes a query snapshot. Records that fail to parse are dropped.
pub fn decode_snapshot<'a, I>(docs: I) -> Vec<Expense>
where
    I: IntoIterator<Item = (&'a String, &'a Map<String, Value>)>,
{
    let mut out: Vec<Expense> = docs
        .into_iter()
        .filter_map(|(id, doc)| match Expense::from_document(id, doc) {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(doc_id = %id, error = %e, "dropping undecodable expense document");
                None
            }
        })
        .collect();
    sort_newest_first(&mut out);
    out
}

pub fn sort_newest_first(expenses: &mut [Expense]) {
    expenses.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
}
