//! Workflow Definition Handlers
//!
//! CRUD for workflows and their steps, plus read-only execution history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use mint_shared::{Workflow, WorkflowExecution, WorkflowStep, WorkflowWithSteps};

use crate::pagination::WorkflowListParams;
use crate::validation::{validate_new_step, validate_new_workflow, validate_step_update, validate_workflow_update};
use crate::workflows::{steps::presets, NewStep, NewWorkflow, StepUpdate, WorkflowError, WorkflowUpdate};
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/:id", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/:id/steps", get(list_steps).post(create_step))
        .route("/:id/steps/:step_id", axum::routing::put(update_step).delete(delete_step))
        .route("/:id/presets/:preset", axum::routing::post(apply_preset))
        .route("/:id/executions", get(list_executions))
        .route("/:id/executions/:execution_id", get(get_execution))
}

// ==================== Workflows ====================

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WorkflowListParams>,
) -> ApiResult<Json<PaginatedResponse<Workflow>>> {
    let filter = params.to_filter();
    let (workflows, total) = state.workflows.list_workflows(&filter).await?;
    Ok(Json(PaginatedResponse::new(workflows, &params.pagination(), total)))
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Json(mut payload): Json<NewWorkflow>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    validate_new_workflow(&payload)?;
    payload.name = payload.name.trim().to_string();

    let workflow = state.workflows.create_workflow(payload).await?;
    info!("Created workflow '{}' ({}) on '{}'", workflow.name, workflow.id, workflow.trigger_event);
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowWithSteps>> {
    let workflow = state.workflows.get_workflow(id).await?;
    let steps = state.workflows.list_steps(id).await?;
    Ok(Json(WorkflowWithSteps { workflow, steps }))
}

async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<WorkflowUpdate>,
) -> ApiResult<Json<Workflow>> {
    validate_workflow_update(&payload)?;
    if let Some(name) = payload.name.as_mut() {
        *name = name.trim().to_string();
    }

    let workflow = state.workflows.update_workflow(id, payload).await?;
    Ok(Json(workflow))
}

async fn delete_workflow(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.workflows.delete_workflow(id).await?;
    info!("Deleted workflow {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Steps ====================

async fn list_steps(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<WorkflowStep>>> {
    state.workflows.get_workflow(id).await?;
    let steps = state.workflows.list_steps(id).await?;
    Ok(Json(steps))
}

async fn create_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewStep>,
) -> ApiResult<(StatusCode, Json<WorkflowStep>)> {
    validate_new_step(&payload)?;

    let step = state.workflows.create_step(id, payload).await?;
    Ok((StatusCode::CREATED, Json(step)))
}

/// Append a pre-built step sequence to a workflow
async fn apply_preset(
    State(state): State<Arc<AppState>>,
    Path((id, preset)): Path<(Uuid, String)>,
) -> ApiResult<(StatusCode, Json<Vec<WorkflowStep>>)> {
    let steps = presets::by_name(&preset).ok_or_else(|| {
        ApiError::not_found(format!(
            "Preset '{}' not found, available: {}",
            preset,
            presets::NAMES.join(", ")
        ))
    })?;
    let created = state.workflows.create_steps(id, steps).await?;

    info!("Applied preset '{}' to workflow {}", preset, id);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_step(
    State(state): State<Arc<AppState>>,
    Path((id, step_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<StepUpdate>,
) -> ApiResult<Json<WorkflowStep>> {
    let existing = state
        .workflows
        .list_steps(id)
        .await?
        .into_iter()
        .find(|s| s.id == step_id)
        .ok_or(WorkflowError::StepNotFound(step_id))?;

    validate_step_update(&existing, &payload)?;

    let step = state.workflows.update_step(id, step_id, payload).await?;
    Ok(Json(step))
}

async fn delete_step(
    State(state): State<Arc<AppState>>,
    Path((id, step_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state.workflows.delete_step(id, step_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Executions ====================

/// History stays readable after its workflow is deleted
async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<WorkflowExecution>>> {
    let (executions, total) = state
        .executions
        .list_for_workflow(id, params.limit(), params.offset())
        .await?;
    Ok(Json(PaginatedResponse::new(executions, &params, total)))
}

async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path((id, execution_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WorkflowExecution>> {
    let execution = state.executions.get(execution_id).await?;
    if execution.workflow_id != id {
        return Err(ApiError::not_found("Workflow execution"));
    }
    Ok(Json(execution))
}
