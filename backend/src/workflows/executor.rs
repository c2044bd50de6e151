// Workflow Executor - Interprets one step against the execution context

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use mint_shared::{StepFailure, WorkflowStep};

use super::collaborators::{CallContext, Collaborators, EntityType, NewDocument, NewTask, OutboundEmail};
use super::error::{ConfigurationError, StepError};
use super::steps::{
    AssignUserConfig, CreateDocumentConfig, CreateTaskConfig, SendEmailConfig, StepConfig, UpdateStatusConfig,
};
use super::template;

/// Data visible to a step: the trigger payload plus outputs of earlier successful steps
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub acting_user: Option<Uuid>,
    pub event_name: String,
    pub event_payload: serde_json::Value,
    pub step_outputs: BTreeMap<i32, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(
        execution_id: Uuid,
        workflow_id: Uuid,
        acting_user: Option<Uuid>,
        event_name: impl Into<String>,
        event_payload: serde_json::Value,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            acting_user,
            event_name: event_name.into(),
            event_payload,
            step_outputs: BTreeMap::new(),
        }
    }

    /// Resolve a dotted path. `steps.<order>.<field>` reads prior step outputs;
    /// anything else reads the trigger payload. Nulls resolve to nothing.
    pub fn lookup(&self, path: &str) -> Option<serde_json::Value> {
        let path = path.trim();
        if let Some(rest) = path.strip_prefix("steps.") {
            let (order, field_path) = rest.split_once('.').unwrap_or((rest, ""));
            let output = self.step_outputs.get(&order.parse::<i32>().ok()?)?;
            return get_nested_value(output, field_path);
        }
        get_nested_value(&self.event_payload, path)
    }

    pub fn record_output(&mut self, order: i32, output: serde_json::Value) {
        self.step_outputs.insert(order, output);
    }

    pub fn call_context(&self) -> CallContext {
        CallContext {
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            acting_user: self.acting_user,
        }
    }
}

fn get_nested_value(json: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = json;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current {
            serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

/// Result of interpreting a single step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub output: Result<serde_json::Value, StepFailure>,
    pub duration_ms: i64,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.output.is_ok()
    }
}

pub struct StepInterpreter {
    collaborators: Collaborators,
}

impl StepInterpreter {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Execute one step. Never fails: configuration and collaborator errors
    /// come back as a failed `StepResult`.
    pub async fn execute(&self, step: &WorkflowStep, context: &ExecutionContext) -> StepResult {
        let start = Instant::now();

        info!("Executing step {} '{}' ({})", step.order, step.name, step.step_type);

        let result = match StepConfig::parse(step.step_type, &step.parameters) {
            Ok(config) => self.dispatch(&config, context).await,
            Err(e) => Err(StepError::from(e)),
        };

        let duration_ms = start.elapsed().as_millis() as i64;

        match result {
            Ok(output) => StepResult {
                output: Ok(output),
                duration_ms,
            },
            Err(e) => {
                warn!("Step {} '{}' failed: {}", step.order, step.name, e);
                StepResult {
                    output: Err(e.to_failure()),
                    duration_ms,
                }
            }
        }
    }

    async fn dispatch(&self, config: &StepConfig, context: &ExecutionContext) -> Result<serde_json::Value, StepError> {
        match config {
            StepConfig::CreateTask(c) => self.execute_create_task(c, context).await,
            StepConfig::SendEmail(c) => self.execute_send_email(c, context).await,
            StepConfig::UpdateStatus(c) => self.execute_update_status(c, context).await,
            StepConfig::AssignUser(c) => self.execute_assign_user(c, context).await,
            StepConfig::CreateDocument(c) => self.execute_create_document(c, context).await,
        }
    }

    // ===== Step Implementations =====

    async fn execute_create_task(
        &self,
        config: &CreateTaskConfig,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        let title = template::render(&config.title, context);
        let description = config
            .description
            .as_deref()
            .map(|d| template::render(d, context))
            .unwrap_or_default();

        let assignee = match &config.assignee {
            Some(resolver) => Some(resolve_uuid("assignee", resolver, context)?),
            None => None,
        };

        let case_id = match &config.case {
            Some(resolver) => Some(resolve_uuid("case", resolver, context)?),
            // Link to the triggering case when there is one
            None => context
                .lookup("case.id")
                .and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok())),
        };

        let due_date = config.due_in_days.map(|days| Utc::now() + Duration::days(days));

        let task = NewTask {
            title: title.clone(),
            description,
            priority: config.priority.as_str().to_string(),
            assignee,
            due_date,
            case_id,
        };

        let task_id = self.collaborators.tasks.create(&context.call_context(), task).await?;

        Ok(serde_json::json!({
            "task_id": task_id,
            "title": title,
            "assignee": assignee,
            "case_id": case_id,
            "due_date": due_date.map(|d| d.to_rfc3339())
        }))
    }

    async fn execute_send_email(
        &self,
        config: &SendEmailConfig,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        let mut recipients = Vec::new();
        for resolver in config.recipients.templates() {
            let resolved = template::render_strict(resolver, context).map_err(|token| ConfigurationError::Unresolved {
                name: "recipients".to_string(),
                token,
            })?;
            recipients.extend(
                resolved
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            );
        }

        if recipients.is_empty() {
            return Err(ConfigurationError::MissingParameter("recipients".to_string()).into());
        }

        let email = OutboundEmail {
            subject: template::render(&config.subject, context),
            body: template::render(&config.body, context),
            recipients: recipients.clone(),
        };

        self.collaborators.email.send(&context.call_context(), email).await?;

        Ok(serde_json::json!({
            "status": "sent",
            "recipients": recipients
        }))
    }

    async fn execute_update_status(
        &self,
        config: &UpdateStatusConfig,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        let entity_id = resolve_entity_id(config.entity, config.entity_id.as_deref(), context)?;
        let value = template::render(&config.value, context);

        self.collaborators
            .records
            .update(
                &context.call_context(),
                config.entity,
                entity_id,
                &config.field,
                serde_json::Value::String(value.clone()),
            )
            .await?;

        Ok(serde_json::json!({
            "entity": config.entity,
            "entity_id": entity_id,
            "field": config.field,
            "value": value
        }))
    }

    async fn execute_assign_user(
        &self,
        config: &AssignUserConfig,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        let entity_id = resolve_entity_id(config.entity, config.entity_id.as_deref(), context)?;
        let user_id = resolve_uuid("user", &config.user, context)?;
        let field = config
            .field
            .clone()
            .unwrap_or_else(|| config.entity.default_assignment_field().to_string());

        self.collaborators
            .records
            .update(
                &context.call_context(),
                config.entity,
                entity_id,
                &field,
                serde_json::json!(user_id),
            )
            .await?;

        Ok(serde_json::json!({
            "entity": config.entity,
            "entity_id": entity_id,
            "field": field,
            "user_id": user_id
        }))
    }

    async fn execute_create_document(
        &self,
        config: &CreateDocumentConfig,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        let title = template::render(&config.title, context);
        let source = template::render(&config.source, context);
        let case_id = context
            .lookup("case.id")
            .and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()));

        let document = NewDocument {
            title: title.clone(),
            document_type: config.document_type.as_str().to_string(),
            source,
            case_id,
        };

        let document_id = self
            .collaborators
            .documents
            .create(&context.call_context(), document)
            .await?;

        Ok(serde_json::json!({
            "document_id": document_id,
            "title": title
        }))
    }
}

fn resolve_uuid(name: &str, resolver: &str, context: &ExecutionContext) -> Result<Uuid, ConfigurationError> {
    let resolved = template::render_strict(resolver, context).map_err(|token| ConfigurationError::Unresolved {
        name: name.to_string(),
        token,
    })?;

    Uuid::parse_str(resolved.trim()).map_err(|_| ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason: format!("'{}' is not a valid UUID", resolved),
    })
}

/// The record a step targets: an explicit resolver, else `<entity>.id`, else `<entity>_id`
fn resolve_entity_id(
    entity: EntityType,
    resolver: Option<&str>,
    context: &ExecutionContext,
) -> Result<Uuid, ConfigurationError> {
    if let Some(resolver) = resolver {
        return resolve_uuid("entity_id", resolver, context);
    }

    let nested = format!("{}.id", entity.as_str());
    let flat = format!("{}_id", entity.as_str());
    let value = context
        .lookup(&nested)
        .or_else(|| context.lookup(&flat))
        .ok_or_else(|| ConfigurationError::Unresolved {
            name: "entity_id".to_string(),
            token: format!("{{{{{}}}}}", nested),
        })?;

    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ConfigurationError::InvalidParameter {
            name: "entity_id".to_string(),
            reason: format!("{} is not a valid UUID", value),
        })
}
