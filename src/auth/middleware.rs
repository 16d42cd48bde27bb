use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::app_state::AppState;
use crate::auth::claims::AuthContext;
use crate::auth::verifier::AuthError;
use crate::error::AppError;

/// Verify the bearer token and attach an [`AuthContext`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?
        .to_string();

    let claims = state.tokens.verify(&token)?;

    req.extensions_mut().insert(AuthContext {
        claims,
        access_token: token,
        admin_group: state.settings.admin_group.clone(),
    });

    Ok(next.run(req).await)
}
