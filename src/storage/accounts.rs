use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{MemoryBackend, Store};
use crate::auth::services::{is_valid_email, normalize_email};
use crate::auth::{AuthProvider, FederatedRequest, FederatedResponse, UserProfile};
use crate::error::GatewayError;
use crate::lock;

const MIN_PROVIDER_PASSWORD: usize = 6;
const NONCE_LEN: usize = 32;

/// A registered principal.
#[derive(Debug, Clone)]
pub(super) struct Account {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    password_hash: Option<String>,
    federated_subject: Option<String>,
}

impl Account {
    fn profile(&self) -> UserProfile {
        UserProfile {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    fn password_matches(&self, plain: &str) -> bool {
        match &self.password_hash {
            Some(hash) => verify_password(plain, hash).unwrap_or_else(|e| {
                error!(uid = %self.uid, error = %e, "stored password hash unreadable");
                false
            }),
            None => false,
        }
    }
}

fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(hash)
}

fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Store {
    fn account_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.email.as_deref() == Some(email))
    }

    fn signed_in_account(&mut self) -> Result<&mut Account, GatewayError> {
        let uid = self.session.clone().ok_or(GatewayError::Unauthenticated)?;
        self.accounts
            .get_mut(&uid)
            .ok_or(GatewayError::Unauthenticated)
    }

    fn start_session(&mut self, account: Account) -> UserProfile {
        let profile = account.profile();
        self.session = Some(account.uid.clone());
        self.accounts.insert(account.uid.clone(), account);
        self.drop_foreign_listeners();
        profile
    }

    fn end_session(&mut self) {
        self.session = None;
        self.drop_foreign_listeners();
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    fn current_user(&self) -> Option<UserProfile> {
        let store = lock(&self.store);
        let uid = store.session.as_ref()?;
        store.accounts.get(uid).map(Account::profile)
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let email = normalize_email(email);
        let found = lock(&self.store).account_by_email(&email).cloned();
        let account = match found {
            Some(account) if account.password_matches(password) => account,
            _ => {
                warn!("email sign-in rejected");
                return Err(GatewayError::InvalidCredentials);
            }
        };
        info!(uid = %account.uid, "signed in with email");
        Ok(lock(&self.store).start_session(account))
    }

    #[instrument(skip(self, password))]
    async fn register_with_email(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile, GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(GatewayError::InvalidEmail);
        }
        if password.chars().count() < MIN_PROVIDER_PASSWORD {
            return Err(GatewayError::Backend(format!(
                "password should be at least {MIN_PROVIDER_PASSWORD} characters"
            )));
        }
        if lock(&self.store).account_by_email(&email).is_some() {
            return Err(GatewayError::EmailAlreadyInUse);
        }

        let password_hash = hash_password(password).map_err(|e| {
            error!(error = %e, "password hashing failed");
            GatewayError::Backend(e.to_string())
        })?;
        let account = Account {
            uid: Uuid::new_v4().to_string(),
            email: Some(email),
            display_name: non_blank(display_name),
            photo_url: None,
            password_hash: Some(password_hash),
            federated_subject: None,
        };

        let mut store = lock(&self.store);
        // re-check, the hash ran without the lock
        if store.account_by_email(account.email.as_deref().unwrap_or_default()).is_some() {
            return Err(GatewayError::EmailAlreadyInUse);
        }
        info!(uid = %account.uid, "account registered");
        Ok(store.start_session(account))
    }

    async fn begin_federated_sign_in(&self) -> Result<FederatedRequest, GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        Ok(FederatedRequest {
            client_id: self.keys.audience.clone(),
            nonce,
        })
    }

    #[instrument(skip_all)]
    async fn sign_in_with_federated(
        &self,
        response: &FederatedResponse,
    ) -> Result<UserProfile, GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let token = response
            .id_token
            .as_deref()
            .ok_or(GatewayError::MissingIdentityToken)?;
        let claims = self.keys.verify(token)?;

        let mut store = lock(&self.store);
        let existing = store
            .accounts
            .values()
            .find(|a| a.federated_subject.as_deref() == Some(claims.sub.as_str()))
            .cloned();
        let account = match existing {
            Some(account) => account,
            None => {
                let account = Account {
                    uid: Uuid::new_v4().to_string(),
                    email: claims.email.as_deref().map(normalize_email),
                    display_name: claims.name.clone(),
                    photo_url: claims.picture.clone(),
                    password_hash: None,
                    federated_subject: Some(claims.sub.clone()),
                };
                info!(uid = %account.uid, "account created from identity token");
                account
            }
        };
        info!(uid = %account.uid, "signed in with identity token");
        Ok(store.start_session(account))
    }

    fn sign_out(&self) {
        lock(&self.store).end_session();
    }

    async fn update_display_name(&self, display_name: &str) -> Result<(), GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let mut store = lock(&self.store);
        let account = store.signed_in_account()?;
        account.display_name = non_blank(display_name);
        info!(uid = %account.uid, "display name updated");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn change_password(&self, current: &str, new: &str) -> Result<(), GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let account = lock(&self.store).signed_in_account()?.clone();
        if account.email.is_none() || !account.has_password() {
            return Err(GatewayError::Backend(
                "account has no password credential".into(),
            ));
        }
        if !account.password_matches(current) {
            warn!(uid = %account.uid, "reauthentication failed");
            return Err(GatewayError::InvalidCredentials);
        }
        if new.chars().count() < MIN_PROVIDER_PASSWORD {
            return Err(GatewayError::Backend(format!(
                "password should be at least {MIN_PROVIDER_PASSWORD} characters"
            )));
        }
        let hash = hash_password(new).map_err(|e| GatewayError::Backend(e.to_string()))?;

        let mut store = lock(&self.store);
        let stored = store.signed_in_account()?;
        stored.password_hash = Some(hash);
        info!(uid = %stored.uid, "password changed");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn delete_account(&self, password: Option<&str>) -> Result<(), GatewayError> {
        self.require_online(GatewayError::NetworkUnavailable)?;
        let account = lock(&self.store).signed_in_account()?.clone();
        if account.has_password() {
            let confirmed = password.is_some_and(|p| account.password_matches(p));
            if !confirmed {
                warn!(uid = %account.uid, "reauthentication failed");
                return Err(GatewayError::InvalidCredentials);
            }
        }
        let mut store = lock(&self.store);
        if store.session.as_deref() != Some(account.uid.as_str()) {
            return Err(GatewayError::Unauthenticated);
        }
        store.accounts.remove(&account.uid);
        store.end_session();
        info!(uid = %account.uid, "account deleted");
        Ok(())
    }
}
