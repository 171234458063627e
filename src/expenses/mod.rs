pub mod controller;
pub mod dto;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use controller::ExpenseController;
pub use dto::{ExpenseFilter, ExpenseState, ExpenseTotals, FeedQuery};
pub use repo::{month_range, ExpenseGateway};
pub use repo_types::{Category, Expense};
