use std::collections::BTreeMap;

use time::{Month, OffsetDateTime};

use super::repo_types::{Category, Expense};

/// Lifecycle of the last user-initiated expense command.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpenseState {
    Idle,
    Loading,
    Success,
    Error(String),
}

/// Active list filter. Replaced wholesale on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    pub category: Option<Category>,
    pub month: Option<Month>,
    pub year: Option<i32>,
}

impl ExpenseFilter {
    pub fn by_category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn by_month(month: Month, year: i32) -> Self {
        Self {
            month: Some(month),
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn current_month() -> Self {
        let now = OffsetDateTime::now_utc();
        Self::by_month(now.month(), now.year())
    }

    /// Which live query backs this filter. A complete month/year pair wins
    /// over a category.
    pub fn query(&self) -> FeedQuery {
        match (self.month, self.year, self.category) {
            (Some(month), Some(year), _) => FeedQuery::Month { month, year },
            (_, _, Some(category)) => FeedQuery::Category(category),
            _ => FeedQuery::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedQuery {
    All,
    Month { month: Month, year: i32 },
    Category(Category),
}

/// Totals derived from the current list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseTotals {
    pub total: f64,
    pub by_category: BTreeMap<Category, f64>,
}

impl ExpenseTotals {
    pub fn from_expenses(expenses: &[Expense]) -> Self {
        let mut by_category = BTreeMap::new();
        let mut total = 0.0;
        for e in expenses {
            total += e.amount;
            *by_category.entry(e.category).or_insert(0.0) += e.amount;
        }
        Self { total, by_category }
    }

    /// Subtotal for one category; zero when it has no expenses.
    pub fn for_category(&self, category: Category) -> f64 {
        self.by_category.get(&category).copied().unwrap_or(0.0)
    }
}
