// Workflow Automation Engine
//
// Event-driven automation for the practice CRM. Domain events are matched
// against active workflows; each match runs its ordered steps as an
// independent execution.

pub mod bus;
pub mod collaborators;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod executor;
pub mod postgres;
pub mod steps;
pub mod store;
pub mod template;
pub mod triggers;

pub use bus::EventBus;
pub use collaborators::{
    CallContext, Collaborators, DocumentCollaborator, EmailCollaborator, EntityType, FieldKind, NewDocument, NewTask,
    OutboundEmail, RecordCollaborator, TaskCollaborator,
};
pub use engine::WorkflowEngine;
pub use error::{CollaboratorError, ConfigurationError, WorkflowError};
pub use executor::{ExecutionContext, StepInterpreter};
#[cfg(test)]
pub use memory::{InMemoryExecutionStore, InMemoryWorkflowStore};
pub use postgres::{PgExecutionStore, PgWorkflowStore};
pub use steps::StepConfig;
pub use store::{
    ExecutionStore, NewStep, NewWorkflow, StepUpdate, WorkflowFilter, WorkflowOrdering, WorkflowStore, WorkflowUpdate,
};
pub use triggers::{EventPayload, EventSource, TriggerEvent};
