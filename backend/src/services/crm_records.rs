// CRM record writes performed on behalf of workflow steps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::workflows::{
    CallContext, CollaboratorError, DocumentCollaborator, EntityType, FieldKind, NewDocument, NewTask,
    RecordCollaborator, TaskCollaborator,
};

/// Accepted values for choice columns. Fields not listed take free text.
fn allowed_values(entity: EntityType, field: &str) -> Option<&'static [&'static str]> {
    let values: &'static [&'static str] = match (entity, field) {
        (EntityType::Case, "status") => &["open", "in_progress", "pending", "closed", "archived"],
        (EntityType::Case | EntityType::Task, "priority") => &["low", "medium", "high", "urgent"],
        (EntityType::Case, "case_type") => &[
            "litigation",
            "corporate",
            "family",
            "criminal",
            "immigration",
            "real_estate",
            "personal_injury",
            "other",
        ],
        (EntityType::Task, "status") => &["pending", "in_progress", "completed", "cancelled"],
        (EntityType::Contact, "status") => &["active", "inactive", "prospect"],
        (EntityType::Contact, "contact_type") => &["individual", "organization"],
        (EntityType::Document, "document_type") => &[
            "contract",
            "pleading",
            "correspondence",
            "evidence",
            "research",
            "template",
            "other",
        ],
        _ => return None,
    };
    Some(values)
}

/// A field value converted to the column's type
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Uuid(Uuid),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

fn coerce_value(
    entity: EntityType,
    field: &str,
    value: &serde_json::Value,
) -> Result<FieldValue, CollaboratorError> {
    let kind = entity
        .field_kind(field)
        .ok_or_else(|| CollaboratorError::Rejected(format!("{} field '{}' is not writable", entity, field)))?;

    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    let rejected = |expected: &str| {
        CollaboratorError::Rejected(format!("{} {} expects {}, got '{}'", entity, field, expected, text))
    };

    match kind {
        FieldKind::Text => {
            if let Some(allowed) = allowed_values(entity, field) {
                if !allowed.contains(&text.as_str()) {
                    return Err(CollaboratorError::Rejected(format!(
                        "'{}' is not a valid {} {} (expected one of: {})",
                        text,
                        entity,
                        field,
                        allowed.join(", ")
                    )));
                }
            }
            Ok(FieldValue::Text(text.clone()))
        }
        FieldKind::Uuid => Uuid::parse_str(&text)
            .map(FieldValue::Uuid)
            .map_err(|_| rejected("a UUID")),
        FieldKind::Bool => match value {
            serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            _ => text.parse().map(FieldValue::Bool).map_err(|_| rejected("true or false")),
        },
        FieldKind::Timestamp => DateTime::parse_from_rfc3339(&text)
            .map(|d| FieldValue::Timestamp(d.with_timezone(&Utc)))
            .map_err(|_| rejected("an RFC 3339 timestamp")),
    }
}

/// Writes tasks, documents and record fields straight to the CRM tables
#[derive(Clone)]
pub struct CrmRecordService {
    db_pool: PgPool,
}

impl CrmRecordService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl TaskCollaborator for CrmRecordService {
    async fn create(&self, ctx: &CallContext, task: NewTask) -> Result<Uuid, CollaboratorError> {
        let task_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, description, status, priority, assigned_to_id, created_by_id, case_id, due_date)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(task.assignee)
        .bind(ctx.acting_user)
        .bind(task.case_id)
        .bind(task.due_date)
        .execute(&self.db_pool)
        .await?;

        info!("Workflow {} created task {} '{}'", ctx.workflow_id, task_id, task.title);
        Ok(task_id)
    }
}

#[async_trait]
impl DocumentCollaborator for CrmRecordService {
    async fn create(&self, ctx: &CallContext, document: NewDocument) -> Result<Uuid, CollaboratorError> {
        let document_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, document_type, source_template, case_id, uploaded_by_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(document_id)
        .bind(&document.title)
        .bind(&document.document_type)
        .bind(&document.source)
        .bind(document.case_id)
        .bind(ctx.acting_user)
        .execute(&self.db_pool)
        .await?;

        info!(
            "Workflow {} created document {} from template '{}'",
            ctx.workflow_id, document_id, document.source
        );
        Ok(document_id)
    }
}

#[async_trait]
impl RecordCollaborator for CrmRecordService {
    async fn update(
        &self,
        ctx: &CallContext,
        entity: EntityType,
        entity_id: Uuid,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        let value = coerce_value(entity, field, &value)?;

        // Table and column names come from the whitelist, never from input
        let mut sql = format!("UPDATE {} SET {} = $1, updated_at = NOW()", entity.table(), field);
        if entity == EntityType::Task && field == "status" {
            sql.push_str(", completed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE NULL END");
        }
        sql.push_str(" WHERE id = $2");

        let query = sqlx::query(&sql);
        let query = match &value {
            FieldValue::Text(v) => query.bind(v.clone()),
            FieldValue::Uuid(v) => query.bind(*v),
            FieldValue::Bool(v) => query.bind(*v),
            FieldValue::Timestamp(v) => query.bind(*v),
        };

        let result = query.bind(entity_id).execute(&self.db_pool).await?;

        if result.rows_affected() == 0 {
            return Err(CollaboratorError::NotFound {
                entity: entity.to_string(),
                id: entity_id,
            });
        }

        info!(
            "Workflow {} set {}.{} on {} to {:?}",
            ctx.workflow_id, entity, field, entity_id, value
        );
        Ok(())
    }
}
