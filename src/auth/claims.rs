use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identity attributes carried by a verified token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Access tokens carry `username`, id tokens `cognito:username`.
    #[serde(default, alias = "cognito:username")]
    pub username: Option<String>,
    #[serde(default, rename = "cognito:groups")]
    pub groups: Vec<String>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// `access` or `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,
    /// App client the access token was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Verified caller attached to each protected request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub access_token: String,
    pub admin_group: String,
}

impl AuthContext {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    /// Directory username, falling back to the subject id.
    pub fn username(&self) -> &str {
        self.claims.username.as_deref().unwrap_or(&self.claims.sub)
    }

    pub fn is_admin(&self) -> bool {
        self.claims.groups.iter().any(|g| g == &self.admin_group)
    }
}

/// Admins may touch anything; everyone else only their own records.
pub fn authorize_owner(ctx: &AuthContext, owner_id: &str) -> Result<(), AppError> {
    if ctx.is_admin() || ctx.user_id() == owner_id {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %ctx.user_id(),
            owner_id,
            "Access denied to resource owned by another user"
        );
        Err(AppError::Forbidden("Access denied".to_string()))
    }
}
