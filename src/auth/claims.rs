use serde::{Deserialize, Serialize};

/// Payload of the identity token returned by the federated provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedClaims {
    pub sub: String,             // subject at the identity provider
    pub email: Option<String>,   // verified email, when shared
    pub name: Option<String>,    // display name
    pub picture: Option<String>, // avatar URL
    pub iat: usize,              // issued at (unix timestamp)
    pub exp: usize,              // expires at (unix timestamp)
    pub iss: String,             // issuer
    pub aud: String,             // audience (our client id)
}
