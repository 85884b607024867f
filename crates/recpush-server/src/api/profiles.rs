use axum::{
    extract::{Path, State},
    Extension, Json,
};
use recpush_core::Profile;
use recpush_pipeline::ProfileOutcome;

use crate::middleware::RequestId;

use super::{map_pipeline_error, map_port_error, ApiError, ApiResponse, AppState};

pub(super) async fn get_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cid): Path<String>,
) -> Result<Json<ApiResponse<Profile>>, ApiError> {
    let profile = state
        .profiles
        .load_profile(&cid)
        .await
        .map_err(|e| map_port_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("no profile stored for cid {cid}"),
            )
        })?;

    Ok(Json(ApiResponse::new(profile, req_id.0)))
}

pub(super) async fn generate_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cid): Path<String>,
) -> Result<Json<ApiResponse<ProfileOutcome>>, ApiError> {
    let outcome = state
        .coordinator
        .generate_profile_for_user(&cid)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}
