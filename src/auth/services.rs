use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::FederatedClaims;
use crate::config::FederatedConfig;
use crate::error::{GatewayError, ValidationError};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() || password.trim().is_empty() {
        return Err(ValidationError::CredentialsRequired);
    }
    Ok(())
}

pub fn validate_registration(
    email: &str,
    password: &str,
    display_name: &str,
    min_password_length: usize,
) -> Result<(), ValidationError> {
    validate_login(email, password)?;
    if display_name.trim().is_empty() {
        return Err(ValidationError::DisplayNameRequired);
    }
    if password.chars().count() < min_password_length {
        return Err(ValidationError::PasswordTooShort {
            min: min_password_length,
        });
    }
    Ok(())
}

pub fn validate_display_name(display_name: &str) -> Result<(), ValidationError> {
    if display_name.trim().is_empty() {
        return Err(ValidationError::DisplayNameRequired);
    }
    Ok(())
}

pub fn validate_password_change(
    current: &str,
    new: &str,
    min_password_length: usize,
) -> Result<(), ValidationError> {
    if current.trim().is_empty() || new.trim().is_empty() {
        return Err(ValidationError::PasswordsRequired);
    }
    if new.chars().count() < min_password_length {
        return Err(ValidationError::NewPasswordTooShort {
            min: min_password_length,
        });
    }
    Ok(())
}

/// Keys for the identity tokens issued by the federated provider.
#[derive(Clone)]
pub struct FederatedKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&FederatedConfig> for FederatedKeys {
    fn from(config: &FederatedConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::from_secs((config.token_ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FederatedKeys {
    /// Issues an identity token the way the identity provider would.
    pub fn sign(
        &self,
        subject: &str,
        email: Option<&str>,
        name: Option<&str>,
        picture: Option<&str>,
    ) -> Result<String, GatewayError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = FederatedClaims {
            sub: subject.to_string(),
            email: email.map(str::to_string),
            name: name.map(str::to_string),
            picture: picture.map(str::to_string),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| GatewayError::Backend(e.to_string()))?;
        debug!(subject, "identity token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<FederatedClaims, GatewayError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<FederatedClaims>(token, &self.decoding, &validation)
            .map_err(|e| GatewayError::InvalidIdentityToken(e.to_string()))?;
        debug!(subject = %data.claims.sub, "identity token verified");
        Ok(data.claims)
    }
}
