use serde::{Deserialize, Serialize};

use super::repo_types::UserProfile;

/// Lifecycle of the last user-initiated auth command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Loading,
    Success(UserProfile),
    Error(String),
}

/// What the platform needs to start the federated sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FederatedRequest {
    pub client_id: String,
    pub nonce: String,
}

/// Opaque result handed back by the platform once the user picked an account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederatedResponse {
    pub id_token: Option<String>,
}
