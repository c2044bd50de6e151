// Workflow Engine - Matches trigger events and drives executions end to end

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use mint_shared::{ExecutionStatus, StepOutcome, StepRecord, Workflow};

use super::conditions;
use super::error::{WorkflowError, WorkflowResult};
use super::executor::{ExecutionContext, StepInterpreter};
use super::store::{ExecutionStore, WorkflowStore};
use super::triggers::{EventPayload, EventSource, TriggerEvent};

/// An execution that has been recorded and handed to its own task
#[derive(Debug)]
pub struct Dispatched {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub handle: JoinHandle<ExecutionStatus>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    interpreter: Arc<StepInterpreter>,
    /// Every spawned run, so shutdown can wait for them
    runs: TaskTracker,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        interpreter: StepInterpreter,
    ) -> Self {
        Self {
            workflows,
            executions,
            interpreter: Arc::new(interpreter),
            runs: TaskTracker::new(),
        }
    }

    /// Number of executions still in flight
    pub fn running(&self) -> usize {
        self.runs.len()
    }

    /// Wait until every spawned execution has finished
    pub async fn drain(&self) {
        self.runs.close();
        self.runs.wait().await;
    }

    /// Trigger entrypoint for in-process callers
    pub async fn on_event(&self, event_name: &str, payload: EventPayload) -> Vec<Dispatched> {
        self.process_event(&TriggerEvent::new(event_name, payload, EventSource::System))
            .await
    }

    /// Create one pending execution per matching workflow whose conditions
    /// accept the payload, and spawn each run.
    /// Returns without waiting for any run to finish; never reports errors to the caller.
    pub async fn process_event(&self, event: &TriggerEvent) -> Vec<Dispatched> {
        let workflows = match self.workflows.find_active_workflows(&event.event_name).await {
            Ok(workflows) => workflows,
            Err(e) => {
                error!("Failed to look up workflows for event '{}': {}", event.event_name, e);
                return Vec::new();
            }
        };

        if workflows.is_empty() {
            info!("No active workflows match event '{}'", event.event_name);
            return Vec::new();
        }

        info!(
            "Event '{}' ({}) matched {} workflow(s)",
            event.event_name,
            event.event_id,
            workflows.len()
        );

        let mut dispatched = Vec::with_capacity(workflows.len());
        for workflow in workflows {
            if !self.conditions_match(&workflow, event) {
                debug!("Workflow '{}' conditions not met for event {}", workflow.name, event.event_id);
                continue;
            }

            let execution = match self
                .executions
                .create(workflow.id, &event.event_name, event.payload.clone())
                .await
            {
                Ok(execution) => execution,
                Err(e) => {
                    error!("Failed to record execution for workflow '{}': {}", workflow.name, e);
                    continue;
                }
            };

            let span = info_span!(
                "workflow_execution",
                execution_id = %execution.id,
                workflow_id = %workflow.id
            );
            let engine = self.clone();
            let execution_id = execution.id;
            let workflow_id = workflow.id;
            let event = event.clone();
            let handle = self
                .runs
                .spawn(async move { engine.run_execution(workflow, execution_id, event).await }.instrument(span));

            dispatched.push(Dispatched {
                execution_id,
                workflow_id,
                handle,
            });
        }

        dispatched
    }

    fn conditions_match(&self, workflow: &Workflow, event: &TriggerEvent) -> bool {
        let Some(group) = &workflow.conditions else {
            return true;
        };
        // Only the payload is visible before a run exists
        let context = ExecutionContext::new(
            Uuid::nil(),
            workflow.id,
            workflow.created_by,
            event.event_name.clone(),
            event.payload.clone(),
        );
        conditions::evaluate(group, &context)
    }

    /// Drive one pending execution to a terminal status
    pub async fn run_execution(&self, workflow: Workflow, execution_id: Uuid, event: TriggerEvent) -> ExecutionStatus {
        match self.execute_steps(&workflow, execution_id, &event).await {
            Ok(()) => match self.executions.finish(execution_id, ExecutionStatus::Completed, None).await {
                Ok(()) => {
                    info!("Workflow '{}' execution {} completed", workflow.name, execution_id);
                    ExecutionStatus::Completed
                }
                Err(e) => self.fail(&workflow, execution_id, e).await,
            },
            Err(e) => self.fail(&workflow, execution_id, e).await,
        }
    }

    async fn execute_steps(&self, workflow: &Workflow, execution_id: Uuid, event: &TriggerEvent) -> WorkflowResult<()> {
        if !event.payload.is_object() {
            return Err(WorkflowError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_type_name(&event.payload)
            )));
        }

        self.executions.mark_running(execution_id).await?;

        // Snapshot: later edits to the definition do not affect this run
        let steps = self.workflows.get_steps(workflow.id).await?;

        let mut context = ExecutionContext::new(
            execution_id,
            workflow.id,
            workflow.created_by,
            event.event_name.clone(),
            event.payload.clone(),
        );

        for step in &steps {
            let executed_at = Utc::now();
            let result = self.interpreter.execute(step, &context).await;

            let (outcome, output, error) = match result.output {
                Ok(output) => (StepOutcome::Success, Some(output), None),
                Err(failure) => (StepOutcome::Failure, None, Some(failure)),
            };

            let record = StepRecord {
                step_order: step.order,
                step_name: step.name.clone(),
                step_type: step.step_type,
                outcome,
                output: output.clone(),
                error,
                executed_at,
                duration_ms: result.duration_ms,
            };

            self.executions.append_step(execution_id, &record).await?;

            // A failed step adds nothing to the context
            if let Some(output) = output {
                context.record_output(step.order, output);
            }
        }

        Ok(())
    }

    async fn fail(&self, workflow: &Workflow, execution_id: Uuid, cause: WorkflowError) -> ExecutionStatus {
        error!("Workflow '{}' execution {} failed: {}", workflow.name, execution_id, cause);

        if let Err(e) = self
            .executions
            .finish(execution_id, ExecutionStatus::Failed, Some(cause.to_string()))
            .await
        {
            warn!("Could not mark execution {} as failed: {}", execution_id, e);
        }

        ExecutionStatus::Failed
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
