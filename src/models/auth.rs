use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[garde(email)]
    pub email: String,

    #[garde(length(min = 8, max = 256))]
    pub password: String,

    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[garde(email)]
    pub email: String,

    #[garde(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[garde(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[garde(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmForgotPasswordRequest {
    #[garde(email)]
    pub email: String,

    #[garde(length(min = 1, max = 64))]
    pub code: String,

    #[garde(length(min = 8, max = 256))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOutcome {
    pub user_sub: String,
    pub confirmed: bool,
}

/// Tokens issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: i32,
    pub token_type: String,
}

/// Profile attributes held by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
}

/// Response for `GET /api/auth/me`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
    pub groups: Vec<String>,
    pub is_admin: bool,
}
