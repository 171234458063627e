mod claims;
pub mod controller;
pub mod dto;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use claims::FederatedClaims;
pub use controller::AuthController;
pub use dto::{AuthState, FederatedRequest, FederatedResponse};
pub use repo::AuthProvider;
pub use repo_types::UserProfile;
pub use services::FederatedKeys;
