use serde::{Deserialize, Serialize};

/// The signed-in principal as reported by the auth provider. Never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,                  // provider user id
    pub email: Option<String>,        // absent for some federated accounts
    pub display_name: Option<String>, // set at registration or later
    pub photo_url: Option<String>,    // federated accounts only
}
