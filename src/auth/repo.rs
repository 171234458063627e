use async_trait::async_trait;

use super::dto::{FederatedRequest, FederatedResponse};
use super::repo_types::UserProfile;
use crate::error::GatewayError;

/// Hosted authentication, seen through the operations the app needs.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The already-authenticated principal, if any.
    fn current_user(&self) -> Option<UserProfile>;

    async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, GatewayError>;

    async fn register_with_email(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile, GatewayError>;

    async fn begin_federated_sign_in(&self) -> Result<FederatedRequest, GatewayError>;

    async fn sign_in_with_federated(
        &self,
        response: &FederatedResponse,
    ) -> Result<UserProfile, GatewayError>;

    fn sign_out(&self);

    async fn update_display_name(&self, display_name: &str) -> Result<(), GatewayError>;

    /// Reauthenticates with `current` before setting `new`.
    async fn change_password(&self, current: &str, new: &str) -> Result<(), GatewayError>;

    /// Reauthenticates first when the account has a password credential.
    async fn delete_account(&self, password: Option<&str>) -> Result<(), GatewayError>;
}
