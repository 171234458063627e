use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FederatedConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub expense_create_timeout: Duration,
    pub min_password_length: usize,
    pub max_expense_name_length: usize,
    pub federated: FederatedConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let federated = FederatedConfig {
            secret: std::env::var("FEDERATED_SECRET")?,
            issuer: std::env::var("FEDERATED_ISSUER")
                .unwrap_or_else(|_| "https://accounts.example.com".into()),
            audience: std::env::var("FEDERATED_AUDIENCE").unwrap_or_else(|_| "gastos-app".into()),
            token_ttl_minutes: parsed_var("FEDERATED_TOKEN_TTL_MINUTES").unwrap_or(60),
        };
        Ok(Self {
            expense_create_timeout: Duration::from_secs(
                parsed_var("EXPENSE_CREATE_TIMEOUT_SECS").unwrap_or(10),
            ),
            min_password_length: parsed_var("MIN_PASSWORD_LENGTH").unwrap_or(6),
            max_expense_name_length: parsed_var("MAX_EXPENSE_NAME_LENGTH").unwrap_or(100),
            federated,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            expense_create_timeout: Duration::from_secs(10),
            min_password_length: 6,
            max_expense_name_length: 100,
            federated: FederatedConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                token_ttl_minutes: 5,
            },
        }
    }
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
