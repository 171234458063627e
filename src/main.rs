use std::time::Duration;

use gastos::auth::AuthState;
use gastos::config::AppConfig;
use gastos::expenses::{Category, ExpenseFilter, ExpenseState};
use gastos::state::AppState;
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "gastos=debug".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (state, _backend) = AppState::in_memory(config);

    let email = std::env::var("DEMO_EMAIL").unwrap_or_else(|_| "demo@example.com".into());
    let password = std::env::var("DEMO_PASSWORD").unwrap_or_else(|_| "demo-pass".into());
    state.auth.register_with_email(&email, &password, "Demo").await;
    let AuthState::Success(profile) = state.auth.current_state() else {
        anyhow::bail!("demo sign-in failed: {:?}", state.auth.current_state());
    };
    tracing::info!(uid = %profile.uid, "demo user signed in");
    state.expenses.refresh();

    let now = OffsetDateTime::now_utc();
    for (name, amount, category) in [
        ("Coffee", "3.5", Category::Food),
        ("Bus pass", "42", Category::Transport),
        ("Cinema", "9.90", Category::Entertainment),
        ("Groceries", "61.25", Category::Food),
    ] {
        state.expenses.add(name, amount, category, now, "").await;
        if let ExpenseState::Error(message) = state.expenses.current_state() {
            tracing::warn!(name, %message, "demo expense not added");
        }
        state.expenses.reset_state();
    }

    // live listeners deliver asynchronously
    tokio::time::sleep(Duration::from_millis(50)).await;
    let totals = state.expenses.current_totals();
    tracing::info!(total = totals.total, "all expenses");
    for (category, amount) in &totals.by_category {
        tracing::info!(category = %category.label(), amount, "by category");
    }

    state.expenses.set_filter(ExpenseFilter::by_category(Category::Food));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(
        total = state.expenses.current_totals().total,
        "food only"
    );

    state.auth.logout();
    Ok(())
}
