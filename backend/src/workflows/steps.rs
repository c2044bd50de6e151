// Workflow Steps - Typed configuration for each step kind
//
// The stored parameter map is free-form JSON. It is parsed into one of these
// structs when a step is saved through the API and again when a run
// snapshots its steps, so a bad map is caught early and can never crash a run.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mint_shared::StepKind;

use super::collaborators::{EntityType, FieldKind};
use super::error::ConfigurationError;
use super::store::NewStep;
use super::template;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Contract,
    Pleading,
    Correspondence,
    Evidence,
    Research,
    Template,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Contract => "contract",
            DocumentType::Pleading => "pleading",
            DocumentType::Correspondence => "correspondence",
            DocumentType::Evidence => "evidence",
            DocumentType::Research => "research",
            DocumentType::Template => "template",
            DocumentType::Other => "other",
        }
    }
}

/// One address template or a list of them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn templates(&self) -> Vec<&str> {
        match self {
            Recipients::One(s) => vec![s.as_str()],
            Recipients::Many(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// User id literal or `{{path}}` resolver
    #[serde(default)]
    pub assignee: Option<String>,
    /// Days from the moment the step runs
    #[serde(default)]
    pub due_in_days: Option<i64>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Case id literal or resolver; defaults to `{{case.id}}` when the payload has one
    #[serde(default)]
    pub case: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendEmailConfig {
    pub subject: String,
    pub body: String,
    pub recipients: Recipients,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateStatusConfig {
    pub entity: EntityType,
    #[serde(default = "default_status_field")]
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignUserConfig {
    pub entity: EntityType,
    pub user: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateDocumentConfig {
    pub title: String,
    pub document_type: DocumentType,
    pub source: String,
}

fn default_status_field() -> String {
    "status".to_string()
}

/// Parameters of a step, validated against its kind
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    CreateTask(CreateTaskConfig),
    SendEmail(SendEmailConfig),
    UpdateStatus(UpdateStatusConfig),
    AssignUser(AssignUserConfig),
    CreateDocument(CreateDocumentConfig),
}

impl StepConfig {
    pub fn parse(kind: StepKind, parameters: &serde_json::Value) -> Result<Self, ConfigurationError> {
        let config = match kind {
            StepKind::CreateTask => {
                let c: CreateTaskConfig = parse_parameters(parameters, &["title"])?;
                if let Some(days) = c.due_in_days {
                    if !(0..=3650).contains(&days) {
                        return Err(invalid("due_in_days", "must be between 0 and 3650"));
                    }
                }
                check_resolver("assignee", c.assignee.as_deref())?;
                check_resolver("case", c.case.as_deref())?;
                StepConfig::CreateTask(c)
            }
            StepKind::SendEmail => {
                let c: SendEmailConfig = parse_parameters(parameters, &["subject", "body", "recipients"])?;
                if c.recipients.templates().iter().all(|r| r.trim().is_empty()) {
                    return Err(ConfigurationError::MissingParameter("recipients".to_string()));
                }
                StepConfig::SendEmail(c)
            }
            StepKind::UpdateStatus => {
                let c: UpdateStatusConfig = parse_parameters(parameters, &["entity", "value"])?;
                if c.entity.field_kind(&c.field).is_none() {
                    return Err(invalid(
                        "field",
                        &format!("'{}' is not a writable {} field", c.field, c.entity),
                    ));
                }
                check_resolver("entity_id", c.entity_id.as_deref())?;
                StepConfig::UpdateStatus(c)
            }
            StepKind::AssignUser => {
                let c: AssignUserConfig = parse_parameters(parameters, &["entity", "user"])?;
                let field = c.field.as_deref().unwrap_or(c.entity.default_assignment_field());
                if c.entity.field_kind(field) != Some(FieldKind::Uuid) {
                    return Err(invalid(
                        "field",
                        &format!("'{}' is not an assignable {} field", field, c.entity),
                    ));
                }
                check_resolver("user", Some(&c.user))?;
                check_resolver("entity_id", c.entity_id.as_deref())?;
                StepConfig::AssignUser(c)
            }
            StepKind::CreateDocument => {
                let c: CreateDocumentConfig =
                    parse_parameters(parameters, &["title", "document_type", "source"])?;
                StepConfig::CreateDocument(c)
            }
        };
        Ok(config)
    }
}

fn parse_parameters<T: DeserializeOwned>(
    parameters: &serde_json::Value,
    required: &[&str],
) -> Result<T, ConfigurationError> {
    let map = parameters
        .as_object()
        .ok_or_else(|| invalid("parameters", "expected a JSON object"))?;

    for &name in required {
        let present = match map.get(name) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(ConfigurationError::MissingParameter(name.to_string()));
        }
    }

    serde_json::from_value(parameters.clone()).map_err(|e| invalid("parameters", &e.to_string()))
}

/// A resolver is either a literal id or a template that produces one at run time
fn check_resolver(name: &str, value: Option<&str>) -> Result<(), ConfigurationError> {
    match value {
        None => Ok(()),
        Some(v) if template::has_placeholders(v) || Uuid::parse_str(v.trim()).is_ok() => Ok(()),
        Some(_) => Err(invalid(name, "expected a UUID or a {{path}} reference")),
    }
}

fn invalid(name: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Pre-built step sequences for common practice workflows
pub mod presets {
    use super::*;

    fn step(order: i32, name: &str, step_type: StepKind, parameters: serde_json::Value) -> NewStep {
        NewStep {
            name: name.to_string(),
            step_type,
            order,
            parameters,
            is_active: true,
        }
    }

    pub const NAMES: &[&str] = &["new_case_intake", "case_closing"];

    pub fn by_name(name: &str) -> Option<Vec<NewStep>> {
        match name {
            "new_case_intake" => Some(new_case_intake()),
            "case_closing" => Some(case_closing()),
            _ => None,
        }
    }

    /// Intake for a newly opened case: review task, client acknowledgement, engagement letter
    pub fn new_case_intake() -> Vec<NewStep> {
        vec![
            step(
                1,
                "Create review task",
                StepKind::CreateTask,
                serde_json::json!({
                    "title": "Review {{case.title}}",
                    "description": "Initial review for case {{case.case_number}}",
                    "due_in_days": 3,
                    "priority": "high"
                }),
            ),
            step(
                2,
                "Acknowledge client",
                StepKind::SendEmail,
                serde_json::json!({
                    "subject": "We have opened your case: {{case.title}}",
                    "body": "Your case {{case.case_number}} has been opened. We will be in touch shortly.",
                    "recipients": "{{contact.email}}"
                }),
            ),
            step(
                3,
                "Draft engagement letter",
                StepKind::CreateDocument,
                serde_json::json!({
                    "title": "Engagement letter - {{case.title}}",
                    "document_type": "correspondence",
                    "source": "engagement-letter"
                }),
            ),
        ]
    }

    /// Close out a case once it is marked closed
    pub fn case_closing() -> Vec<NewStep> {
        vec![
            step(
                1,
                "Archive case",
                StepKind::UpdateStatus,
                serde_json::json!({ "entity": "case", "value": "archived" }),
            ),
            step(
                2,
                "Closing letter",
                StepKind::CreateDocument,
                serde_json::json!({
                    "title": "Closing letter - {{case.title}}",
                    "document_type": "correspondence",
                    "source": "closing-letter"
                }),
            ),
        ]
    }
}
