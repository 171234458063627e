use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::dto::{AuthState, FederatedRequest, FederatedResponse};
use super::repo::AuthProvider;
use super::repo_types::UserProfile;
use super::services::{
    validate_display_name, validate_login, validate_password_change, validate_registration,
};
use crate::config::AppConfig;
use crate::error::{GatewayError, ValidationError};

/// Observable authentication state. Cheap to clone.
#[derive(Clone)]
pub struct AuthController {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn AuthProvider>,
    state: watch::Sender<AuthState>,
    current_user: watch::Sender<Option<UserProfile>>,
    min_password_length: usize,
}

impl AuthController {
    /// Picks up an already-authenticated principal from the provider.
    pub fn new(provider: Arc<dyn AuthProvider>, config: &AppConfig) -> Self {
        let user = provider.current_user();
        let initial = match &user {
            Some(profile) => {
                info!(uid = %profile.uid, "restored signed-in session");
                AuthState::Success(profile.clone())
            }
            None => AuthState::Idle,
        };
        Self {
            inner: Arc::new(Inner {
                provider,
                state: watch::Sender::new(initial),
                current_user: watch::Sender::new(user),
                min_password_length: config.min_password_length,
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.inner.current_user.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.current_user.borrow().clone()
    }

    pub fn is_user_logged_in(&self) -> bool {
        self.inner.provider.current_user().is_some()
    }

    #[instrument(skip(self, password))]
    pub async fn login_with_email(&self, email: &str, password: &str) {
        if let Err(e) = validate_login(email, password) {
            self.reject(e);
            return;
        }
        self.set_state(AuthState::Loading);
        let result = self.inner.provider.sign_in_with_email(email, password).await;
        self.finish_sign_in(result, "email login");
    }

    #[instrument(skip(self, password))]
    pub async fn register_with_email(&self, email: &str, password: &str, display_name: &str) {
        if let Err(e) =
            validate_registration(email, password, display_name, self.inner.min_password_length)
        {
            self.reject(e);
            return;
        }
        self.set_state(AuthState::Loading);
        let result = self
            .inner
            .provider
            .register_with_email(email, password, display_name)
            .await;
        self.finish_sign_in(result, "registration");
    }

    /// Starts the federated hand-off. The platform runs the returned request
    /// and passes its outcome to `complete_federated_login`.
    #[instrument(skip(self))]
    pub async fn begin_federated_login(&self) -> Option<FederatedRequest> {
        self.set_state(AuthState::Loading);
        match self.inner.provider.begin_federated_sign_in().await {
            Ok(request) => Some(request),
            Err(e) => {
                error!(error = %e, "federated sign-in could not start");
                self.set_state(AuthState::Error(e.to_string()));
                None
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn complete_federated_login(&self, response: FederatedResponse) {
        self.set_state(AuthState::Loading);
        let result = self.inner.provider.sign_in_with_federated(&response).await;
        self.finish_sign_in(result, "federated login");
    }

    pub fn logout(&self) {
        self.inner.provider.sign_out();
        self.inner.current_user.send_replace(None);
        self.set_state(AuthState::Idle);
        info!("signed out");
    }

    #[instrument(skip(self))]
    pub async fn update_display_name(&self, display_name: &str) {
        if let Err(e) = validate_display_name(display_name) {
            self.reject(e);
            return;
        }
        self.set_state(AuthState::Loading);
        let result = self
            .inner
            .provider
            .update_display_name(display_name)
            .await
            .and_then(|()| {
                self.inner
                    .provider
                    .current_user()
                    .ok_or(GatewayError::Unauthenticated)
            });
        self.finish_sign_in(result, "display name change");
    }

    #[instrument(skip_all)]
    pub async fn change_password(&self, current: &str, new: &str) {
        if let Err(e) = validate_password_change(current, new, self.inner.min_password_length) {
            self.reject(e);
            return;
        }
        self.set_state(AuthState::Loading);
        let result = self
            .inner
            .provider
            .change_password(current, new)
            .await
            .and_then(|()| {
                self.profile()
                    .or_else(|| self.inner.provider.current_user())
                    .ok_or(GatewayError::Unauthenticated)
            });
        self.finish_sign_in(result, "password change");
    }

    /// On success the profile is gone, so the state returns to `Idle`.
    #[instrument(skip_all)]
    pub async fn delete_account(&self, password: Option<&str>) {
        self.set_state(AuthState::Loading);
        match self.inner.provider.delete_account(password).await {
            Ok(()) => {
                info!("account deleted");
                self.inner.current_user.send_replace(None);
                self.set_state(AuthState::Idle);
            }
            Err(e) => {
                error!(error = %e, "account deletion failed");
                self.set_state(AuthState::Error(e.to_string()));
            }
        }
    }

    pub fn reset_state(&self) {
        self.set_state(AuthState::Idle);
    }

    fn reject(&self, e: ValidationError) {
        warn!(error = %e, "auth input rejected");
        self.set_state(AuthState::Error(e.to_string()));
    }

    fn finish_sign_in(&self, result: Result<UserProfile, GatewayError>, action: &str) {
        match result {
            Ok(profile) => {
                info!(uid = %profile.uid, action, "auth succeeded");
                self.inner.current_user.send_replace(Some(profile.clone()));
                self.set_state(AuthState::Success(profile));
            }
            Err(e) => {
                error!(error = %e, action, "auth failed");
                self.set_state(AuthState::Error(e.to_string()));
            }
        }
    }

    fn set_state(&self, next: AuthState) {
        self.inner.state.send_replace(next);
    }
}
