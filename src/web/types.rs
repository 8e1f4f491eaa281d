use serde::{Deserialize, Serialize};

use crate::types::{Identity, RecordId};

/// `/auth/callback` query parameters.
#[derive(Debug, Deserialize)]
pub(super) struct CallbackParams {
    #[serde(default)]
    pub(super) sso: String,
    #[serde(default)]
    pub(super) sig: String,
}

/// `/profile` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<&Identity> for ProfileResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.external_id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
        }
    }
}

/// `/is-admin` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCheckResponse {
    pub is_admin: bool,
}

/// `/api/register-subdomain` body. Every field is required; absence is reported
/// as invalid input rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubdomainRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubdomainResponse {
    pub success: bool,
    pub record_id: RecordId,
}
