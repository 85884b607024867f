use axum::{
    extract::{Path, State},
    Extension, Json,
};
use recpush_pipeline::{PushOutcome, PushStageReport};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

pub(super) async fn push_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(cid): Path<String>,
) -> Result<Json<ApiResponse<PushOutcome>>, ApiError> {
    let outcome = state
        .coordinator
        .push_for_user(&cid)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}

/// Push every cached snapshot followed by the hot-topic broadcast.
pub(super) async fn push_all(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<PushStageReport>> {
    let report = state.coordinator.push_all().await;
    Json(ApiResponse::new(report, req_id.0))
}
