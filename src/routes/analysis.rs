use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::app_state::AppState;
use crate::auth::{authorize_owner, AuthContext};
use crate::error::AppError;
use crate::models::analysis::AnalysisView;
use crate::models::api::ApiResponse;

/// GET /api/analysis
pub async fn list_analyses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<AnalysisView>>>, AppError> {
    let owner = (!auth.is_admin()).then(|| auth.user_id());
    let analyses = state.store.list_analyses(owner).await?;
    Ok(Json(ApiResponse::ok(
        analyses.iter().map(AnalysisView::from).collect(),
    )))
}

/// GET /api/analysis/{id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AnalysisView>>, AppError> {
    let analysis = state
        .store
        .get_analysis(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;
    authorize_owner(&auth, &analysis.user_id)?;
    Ok(Json(ApiResponse::ok(AnalysisView::from(&analysis))))
}
