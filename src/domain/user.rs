//! User and identity domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::Permission;

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Azure,
    Github,
    Google,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Azure => write!(f, "azure"),
            Provider::Github => write!(f, "github"),
            Provider::Google => write!(f, "google"),
        }
    }
}

/// Canonical user attributes derived from a provider profile.
///
/// Derived once per sign-in and immutable until re-authentication or an
/// explicit refresh; the policy layer only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttributes {
    /// Email domain (substring after `@`); empty when the email has no domain
    pub domain: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// An authenticated user with resolved permissions.
///
/// `permissions` is only ever written by the permission resolver; callers
/// rebuild it through `AccessEngine::update_user_permissions` after a policy
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub provider: Provider,
    pub attributes: UserAttributes,
    pub permissions: Vec<Permission>,
    pub authenticated_at: DateTime<Utc>,
}
