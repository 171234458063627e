use std::sync::Arc;

use crate::auth::{AuthController, AuthProvider};
use crate::config::AppConfig;
use crate::expenses::{ExpenseController, ExpenseGateway};
use crate::storage::MemoryBackend;

/// Everything a screen needs. Must be built inside a tokio runtime.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthController,
    pub expenses: ExpenseController,
}

impl AppState {
    pub fn from_parts(
        config: Arc<AppConfig>,
        gateway: Arc<dyn ExpenseGateway>,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        let auth = AuthController::new(provider, &config);
        let expenses = ExpenseController::new(gateway, &config);
        Self {
            config,
            auth,
            expenses,
        }
    }

    /// Wires both controllers to one in-process backend, returned for fault
    /// injection.
    pub fn in_memory(config: AppConfig) -> (Self, Arc<MemoryBackend>) {
        let config = Arc::new(config);
        let backend = Arc::new(MemoryBackend::new(&config));
        let state = Self::from_parts(config, backend.clone(), backend.clone());
        (state, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::expenses::{Category, ExpenseState};
    use std::time::Duration;
    use time::OffsetDateTime;

    async fn settle<T, F>(rx: &mut tokio::sync::watch::Receiver<T>, ok: F)
    where
        F: FnMut(&T) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(ok))
            .await
            .expect("condition reached")
            .expect("sender alive");
    }

    #[tokio::test]
    async fn sign_in_then_track_expenses() {
        let (state, _backend) = AppState::in_memory(AppConfig::default());
        state
            .auth
            .register_with_email("ana@example.com", "secret1", "Ana")
            .await;
        assert!(matches!(state.auth.current_state(), AuthState::Success(_)));

        // the feed opened before sign-in completed empty, reopen it
        state.expenses.refresh();
        state
            .expenses
            .add("Coffee", "3.5", Category::Food, OffsetDateTime::now_utc(), "")
            .await;
        assert_eq!(state.expenses.current_state(), ExpenseState::Success);

        let mut totals = state.expenses.totals();
        settle(&mut totals, |t| t.total == 3.5).await;
        assert_eq!(state.expenses.current_totals().for_category(Category::Food), 3.5);
    }

    #[tokio::test]
    async fn slow_backend_times_out_add() {
        let config = AppConfig {
            expense_create_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        };
        let (state, backend) = AppState::in_memory(config);
        state
            .auth
            .register_with_email("ana@example.com", "secret1", "Ana")
            .await;
        backend.set_write_latency(Duration::from_millis(500));

        state
            .expenses
            .add("Coffee", "3.5", Category::Food, OffsetDateTime::now_utc(), "")
            .await;
        assert_eq!(
            state.expenses.current_state(),
            ExpenseState::Error(crate::error::GatewayError::Timeout.to_string())
        );
    }
}
