// Workflow Collaborators - Interfaces through which steps reach the rest of the CRM
//
// Steps never touch storage or transports directly. Every side effect goes
// through one of these traits with an explicit `CallContext`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::error::CollaboratorError;

#[cfg(test)]
use mockall::automock;

/// Who is acting, passed into every collaborator call
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    /// Workflow owner, recorded as the author of created records
    pub acting_user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub assignee: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub case_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub document_type: String,
    pub source: String,
    pub case_id: Option<Uuid>,
}

/// CRM record types a step may update
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Case,
    Task,
    Contact,
    Document,
}

/// Column type of a writable field, used to bind the new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Uuid,
    Bool,
    Timestamp,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Case => "case",
            EntityType::Task => "task",
            EntityType::Contact => "contact",
            EntityType::Document => "document",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Case => "cases",
            EntityType::Task => "tasks",
            EntityType::Contact => "contacts",
            EntityType::Document => "documents",
        }
    }

    /// Fields workflows are allowed to write. Anything else is rejected.
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        let kind = match (self, field) {
            (EntityType::Case, "status" | "priority" | "case_type" | "court" | "judge" | "opposing_counsel") => FieldKind::Text,
            (EntityType::Case, "assigned_lawyer_id") => FieldKind::Uuid,
            (EntityType::Case, "statute_of_limitations") => FieldKind::Timestamp,
            (EntityType::Task, "status" | "priority") => FieldKind::Text,
            (EntityType::Task, "assigned_to_id") => FieldKind::Uuid,
            (EntityType::Task, "due_date") => FieldKind::Timestamp,
            (EntityType::Contact, "status" | "contact_type") => FieldKind::Text,
            (EntityType::Contact, "owner_id") => FieldKind::Uuid,
            (EntityType::Document, "document_type") => FieldKind::Text,
            (EntityType::Document, "uploaded_by_id") => FieldKind::Uuid,
            (EntityType::Document, "is_confidential") => FieldKind::Bool,
            _ => return None,
        };
        Some(kind)
    }

    pub fn default_assignment_field(&self) -> &'static str {
        match self {
            EntityType::Case => "assigned_lawyer_id",
            EntityType::Task => "assigned_to_id",
            EntityType::Contact => "owner_id",
            EntityType::Document => "uploaded_by_id",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskCollaborator: Send + Sync {
    async fn create(&self, ctx: &CallContext, task: NewTask) -> Result<Uuid, CollaboratorError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmailCollaborator: Send + Sync {
    async fn send(&self, ctx: &CallContext, email: OutboundEmail) -> Result<(), CollaboratorError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordCollaborator: Send + Sync {
    async fn update(
        &self,
        ctx: &CallContext,
        entity: EntityType,
        entity_id: Uuid,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentCollaborator: Send + Sync {
    async fn create(&self, ctx: &CallContext, document: NewDocument) -> Result<Uuid, CollaboratorError>;
}

/// The set of collaborators a step interpreter dispatches to
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskCollaborator>,
    pub email: Arc<dyn EmailCollaborator>,
    pub records: Arc<dyn RecordCollaborator>,
    pub documents: Arc<dyn DocumentCollaborator>,
}
