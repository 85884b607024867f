use axum::{
    extract::{Path, State},
    Extension, Json,
};
use recpush_core::RecommendationItem;

use crate::middleware::RequestId;

use super::{map_pipeline_error, map_port_error, ApiError, ApiResponse, AppState};

pub(super) async fn get_recommendations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cid): Path<String>,
) -> Result<Json<ApiResponse<Vec<RecommendationItem>>>, ApiError> {
    let items = state
        .recommendations
        .load_cached_recommendations(&cid)
        .await
        .map_err(|e| map_port_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("no recommendations cached for cid {cid}"),
            )
        })?;

    Ok(Json(ApiResponse::new(items, req_id.0)))
}

/// Rebuild the snapshot now, regenerating the profile first if newer
/// activity exists.
pub(super) async fn refresh_recommendations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cid): Path<String>,
) -> Result<Json<ApiResponse<Vec<RecommendationItem>>>, ApiError> {
    let items = state
        .coordinator
        .refresh_user_recommendations(&cid)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(items, req_id.0)))
}
