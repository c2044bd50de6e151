// Workflow Triggers - Domain events that can start workflow executions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event names emitted by the CRM layer
pub mod events {
    pub const CASE_CREATED: &str = "case_created";
    pub const CASE_STATUS_CHANGED: &str = "case_status_changed";
    pub const TASK_STATUS_CHANGED: &str = "task_status_changed";
    pub const TASK_DUE_DATE_APPROACHING: &str = "task_due_date_approaching";
    pub const CONTACT_CREATED: &str = "contact_created";
}

/// Payload for trigger events
pub type EventPayload = serde_json::Value;

/// A named domain occurrence, matched against each workflow's `trigger_event`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub payload: EventPayload,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Source of the trigger event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventSource {
    System,
    User(Uuid),
    Api,
    Scheduler,
}

impl TriggerEvent {
    pub fn new(event_name: impl Into<String>, payload: EventPayload, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_name: event_name.into(),
            payload,
            source,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn case_created(
        case_id: Uuid,
        case_number: &str,
        title: &str,
        case_type: &str,
        client: Option<(Uuid, &str)>,
        created_by: Uuid,
    ) -> Self {
        let contact = client.map(|(id, email)| serde_json::json!({ "id": id, "email": email }));
        Self::new(
            events::CASE_CREATED,
            serde_json::json!({
                "case": {
                    "id": case_id,
                    "case_number": case_number,
                    "title": title,
                    "case_type": case_type,
                    "status": "open"
                },
                "contact": contact,
                "created_by": created_by
            }),
            EventSource::User(created_by),
        )
    }

    pub fn case_status_changed(
        case_id: Uuid,
        title: &str,
        old_status: &str,
        new_status: &str,
        changed_by: Uuid,
    ) -> Self {
        Self::new(
            events::CASE_STATUS_CHANGED,
            serde_json::json!({
                "case": { "id": case_id, "title": title, "status": new_status },
                "old_status": old_status,
                "new_status": new_status,
                "changed_by": changed_by
            }),
            EventSource::User(changed_by),
        )
    }

    pub fn task_status_changed(
        task_id: Uuid,
        title: &str,
        case_id: Option<Uuid>,
        old_status: &str,
        new_status: &str,
        changed_by: Uuid,
    ) -> Self {
        Self::new(
            events::TASK_STATUS_CHANGED,
            serde_json::json!({
                "task": { "id": task_id, "title": title, "status": new_status },
                "case": case_id.map(|id| serde_json::json!({ "id": id })),
                "old_status": old_status,
                "new_status": new_status,
                "changed_by": changed_by
            }),
            EventSource::User(changed_by),
        )
    }

    pub fn task_due_date_approaching(
        task_id: Uuid,
        title: &str,
        status: &str,
        due_date: DateTime<Utc>,
        case_id: Option<Uuid>,
        assigned_to: Option<Uuid>,
    ) -> Self {
        Self::new(
            events::TASK_DUE_DATE_APPROACHING,
            serde_json::json!({
                "task": {
                    "id": task_id,
                    "title": title,
                    "status": status,
                    "due_date": due_date.to_rfc3339(),
                    "assigned_to_id": assigned_to
                },
                "case": case_id.map(|id| serde_json::json!({ "id": id }))
            }),
            EventSource::Scheduler,
        )
    }

    pub fn contact_created(contact_id: Uuid, name: &str, email: &str, created_by: Uuid) -> Self {
        Self::new(
            events::CONTACT_CREATED,
            serde_json::json!({
                "contact": { "id": contact_id, "name": name, "email": email },
                "created_by": created_by
            }),
            EventSource::User(created_by),
        )
    }

    /// Add correlation ID for tracking related events
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
