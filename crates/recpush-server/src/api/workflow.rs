use axum::{extract::State, Extension, Json};
use recpush_pipeline::{TaskDescriptor, WorkflowReport};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

/// Run the full workflow synchronously and return its report.
pub(super) async fn run_workflow(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkflowReport>>, ApiError> {
    tracing::info!(request_id = %req_id.0, "api: manual workflow run requested");
    let report = state
        .coordinator
        .run_full_workflow()
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(report, req_id.0)))
}

pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<TaskDescriptor>>> {
    Json(ApiResponse::new(state.scheduler.tasks(), req_id.0))
}
