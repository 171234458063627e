use thiserror::Error;

/// Local input checks. Raised before any I/O is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name required")]
    NameRequired,
    #[error("name too long (max {max} characters)")]
    NameTooLong { max: usize },
    #[error("invalid amount")]
    InvalidAmount,
    #[error("email and password are required")]
    CredentialsRequired,
    #[error("display name is required")]
    DisplayNameRequired,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("current and new password are required")]
    PasswordsRequired,
    #[error("new password must be at least {min} characters")]
    NewPasswordTooShort { min: usize },
}

/// Failures reported by the persistence/auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("you are not signed in, sign in again and retry")]
    Unauthenticated,
    #[error("invalid expense id")]
    InvalidId,
    #[error("no internet connection, check your connection and retry")]
    NetworkUnavailable,
    #[error("the operation took too long, check your internet connection")]
    Timeout,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("the email address is already in use")]
    EmailAlreadyInUse,
    #[error("the email address is badly formatted")]
    InvalidEmail,
    #[error("no identity token received from the provider")]
    MissingIdentityToken,
    #[error("invalid identity token: {0}")]
    InvalidIdentityToken(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_user_facing() {
        assert_eq!(ValidationError::NameRequired.to_string(), "name required");
        assert_eq!(ValidationError::InvalidAmount.to_string(), "invalid amount");
        assert_eq!(
            ValidationError::PasswordTooShort { min: 6 }.to_string(),
            "password must be at least 6 characters"
        );
    }

    #[test]
    fn timeout_is_distinct_from_backend_errors() {
        let timeout = GatewayError::Timeout.to_string();
        let backend = GatewayError::Backend("deadline".into()).to_string();
        assert_ne!(timeout, backend);
        assert!(backend.contains("deadline"));
    }
}
