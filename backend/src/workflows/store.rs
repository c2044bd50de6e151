// Workflow Stores - Persistence seams for definitions and execution history

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mint_shared::{ConditionGroup, ExecutionStatus, StepKind, StepRecord, Workflow, WorkflowExecution, WorkflowStep};

use super::error::WorkflowResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_event: String,
    #[serde(default)]
    pub conditions: Option<ConditionGroup>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_event: Option<String>,
    /// An empty group clears the workflow's conditions
    pub conditions: Option<ConditionGroup>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub name: String,
    pub step_type: StepKind,
    pub order: i32,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepUpdate {
    pub name: Option<String>,
    pub step_type: Option<StepKind>,
    pub order: Option<i32>,
    pub parameters: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOrdering {
    #[default]
    CreatedAtDesc,
    CreatedAt,
    Name,
    NameDesc,
}

/// Definition listing filters
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub is_active: Option<bool>,
    pub trigger_event: Option<String>,
    /// Case-insensitive match on name or description
    pub search: Option<String>,
    pub ordering: WorkflowOrdering,
    pub limit: i64,
    pub offset: i64,
}

impl WorkflowFilter {
    pub fn matches(&self, workflow: &Workflow) -> bool {
        if let Some(active) = self.is_active {
            if workflow.is_active != active {
                return false;
            }
        }
        if let Some(trigger) = &self.trigger_event {
            if &workflow.trigger_event != trigger {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !workflow.name.to_lowercase().contains(&needle)
                && !workflow.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Stored form of a conditions update: empty groups are dropped
pub fn normalize_conditions(conditions: Option<ConditionGroup>) -> Option<ConditionGroup> {
    conditions.filter(|group| !group.is_empty())
}

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Workflow definitions. The engine only reads through `find_active_workflows`
/// and `get_steps`; the rest backs the management API.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Active workflows whose trigger matches `event_name` exactly
    async fn find_active_workflows(&self, event_name: &str) -> WorkflowResult<Vec<Workflow>>;

    /// Active steps of a workflow in ascending order, as an owned snapshot
    async fn get_steps(&self, workflow_id: Uuid) -> WorkflowResult<Vec<WorkflowStep>>;

    async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<(Vec<Workflow>, i64)>;
    async fn get_workflow(&self, id: Uuid) -> WorkflowResult<Workflow>;
    async fn create_workflow(&self, input: NewWorkflow) -> WorkflowResult<Workflow>;
    async fn update_workflow(&self, id: Uuid, update: WorkflowUpdate) -> WorkflowResult<Workflow>;
    /// Removes the workflow and its steps. Execution history is kept.
    async fn delete_workflow(&self, id: Uuid) -> WorkflowResult<()>;

    /// All steps, active or not, in ascending order
    async fn list_steps(&self, workflow_id: Uuid) -> WorkflowResult<Vec<WorkflowStep>>;
    async fn create_step(&self, workflow_id: Uuid, input: NewStep) -> WorkflowResult<WorkflowStep>;
    /// Insert several steps atomically: on any error none of them are stored
    async fn create_steps(&self, workflow_id: Uuid, inputs: Vec<NewStep>) -> WorkflowResult<Vec<WorkflowStep>>;
    async fn update_step(&self, workflow_id: Uuid, step_id: Uuid, update: StepUpdate) -> WorkflowResult<WorkflowStep>;
    async fn delete_step(&self, workflow_id: Uuid, step_id: Uuid) -> WorkflowResult<()>;
}

/// Execution history. Records only move forward through
/// pending -> running -> completed | failed.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a pending record with an empty step list
    async fn create(
        &self,
        workflow_id: Uuid,
        trigger_event: &str,
        trigger_data: serde_json::Value,
    ) -> WorkflowResult<WorkflowExecution>;

    async fn mark_running(&self, id: Uuid) -> WorkflowResult<()>;

    /// Append a step record. Only allowed while the execution is running.
    async fn append_step(&self, id: Uuid, record: &StepRecord) -> WorkflowResult<()>;

    /// Move to a terminal status and stamp `completed_at`
    async fn finish(&self, id: Uuid, status: ExecutionStatus, error: Option<String>) -> WorkflowResult<()>;

    async fn get(&self, id: Uuid) -> WorkflowResult<WorkflowExecution>;

    /// Newest first, with the total count
    async fn list_for_workflow(
        &self,
        workflow_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> WorkflowResult<(Vec<WorkflowExecution>, i64)>;
}
