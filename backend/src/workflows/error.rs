// Workflow Errors - Failure taxonomy for the automation engine

use mint_shared::{ExecutionStatus, FailureKind, StepFailure};
use thiserror::Error;
use uuid::Uuid;

/// Store and orchestration failures. These never reach the event publisher:
/// the engine turns them into a failed execution or a log line.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),
    #[error("Workflow step {0} not found")]
    StepNotFound(Uuid),
    #[error("Execution {0} not found")]
    ExecutionNotFound(Uuid),
    #[error("Workflow {workflow_id} already has a step with order {order}")]
    DuplicateStepOrder { workflow_id: Uuid, order: i32 },
    #[error("Execution {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("Execution {0} is not running")]
    NotRunning(Uuid),
    #[error("Malformed trigger payload: {0}")]
    MalformedPayload(String),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Missing or malformed step parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("parameter '{name}' references unresolved value '{token}'")]
    Unresolved { name: String, token: String },
}

/// An external collaborator call did not succeed
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: Uuid },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Why a single step failed. Either variant leaves the run going.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Configuration(_) => FailureKind::Configuration,
            StepError::Collaborator(_) => FailureKind::Collaborator,
        }
    }

    pub fn to_failure(&self) -> StepFailure {
        let message = match self {
            StepError::Configuration(e) => e.to_string(),
            StepError::Collaborator(e) => e.to_string(),
        };
        StepFailure {
            kind: self.kind(),
            message,
        }
    }
}
