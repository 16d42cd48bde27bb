use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::app_state::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;
use crate::models::api::ApiResponse;
use crate::routes::extract::ValidJson;
use crate::services::identity::IdentityError;
use crate::models::auth::{
    AuthTokens, ConfirmForgotPasswordRequest, ForgotPasswordRequest, MeResponse, RefreshRequest,
    SignInRequest, SignUpOutcome, SignUpRequest,
};

/// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SignUpRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SignUpOutcome>>), AppError> {
    let outcome = state
        .identity
        .sign_up(&req.email, &req.password, req.name.as_deref())
        .await?;

    tracing::info!(user_sub = %outcome.user_sub, confirmed = outcome.confirmed, "User signed up");

    let message = if outcome.confirmed {
        "Account created"
    } else {
        "Account created. Check your email to confirm it"
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(outcome).with_message(message)),
    ))
}

/// POST /api/auth/signin
pub async fn sign_in(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SignInRequest>,
) -> Result<Json<ApiResponse<AuthTokens>>, AppError> {
    let tokens = state.identity.sign_in(&req.email, &req.password).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> Result<Json<ApiResponse<AuthTokens>>, AppError> {
    let tokens = state.identity.refresh(&req.refresh_token).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    // Unknown accounts get the same reply as known ones.
    match state.identity.forgot_password(&req.email).await {
        Ok(()) | Err(IdentityError::UserNotFound) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(Json(ApiResponse::message(
        "If the account exists, a reset code has been sent",
    )))
}

/// POST /api/auth/confirm-forgot-password
pub async fn confirm_forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ConfirmForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state
        .identity
        .confirm_forgot_password(&req.email, &req.code, &req.new_password)
        .await?;
    Ok(Json(ApiResponse::message("Password has been reset")))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    let profile = state.identity.profile(&auth.access_token).await?;
    Ok(Json(ApiResponse::ok(MeResponse {
        user_id: auth.user_id().to_string(),
        username: profile.username,
        email: profile.email.or_else(|| auth.claims.email.clone()),
        name: profile.name,
        email_verified: profile.email_verified,
        groups: auth.claims.groups.clone(),
        is_admin: auth.is_admin(),
    })))
}

/// DELETE /api/auth/me
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.identity.delete_self(&auth.access_token).await?;
    tracing::info!(user_id = %auth.user_id(), "Account deleted");
    Ok(Json(ApiResponse::message("Account deleted")))
}

/// PATCH /api/auth/upgrade: join the upgrade group. Takes effect on the next token.
pub async fn upgrade(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let group = &state.settings.upgrade_group;
    if auth.claims.groups.iter().any(|g| g == group) {
        return Err(AppError::Conflict(format!("Already a member of '{group}'")));
    }

    state.identity.add_to_group(auth.username(), group).await?;
    tracing::info!(user_id = %auth.user_id(), group = %group, "Account upgraded");

    Ok(Json(ApiResponse::message(format!(
        "Account upgraded to '{group}'. Refresh your session to apply it"
    ))))
}
