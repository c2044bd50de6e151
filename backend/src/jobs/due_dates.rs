// Due Date Monitor Job - Announces tasks whose due date is approaching

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::scheduler::JobResult;
use crate::workflows::{EventBus, TriggerEvent};

pub struct DueDateMonitorJob {
    db_pool: PgPool,
    bus: EventBus,
    window_hours: i32,
}

#[derive(Debug, Default)]
pub struct DueDateCheckResult {
    pub tasks_checked: i32,
    pub events_published: i32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DueTask {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub case_id: Option<Uuid>,
    pub assigned_to_id: Option<Uuid>,
}

impl DueTask {
    pub fn to_event(&self) -> TriggerEvent {
        TriggerEvent::task_due_date_approaching(
            self.id,
            &self.title,
            &self.status,
            self.due_date,
            self.case_id,
            self.assigned_to_id,
        )
    }
}

impl DueDateMonitorJob {
    pub fn new(db_pool: PgPool, bus: EventBus, window_hours: i32) -> Self {
        Self {
            db_pool,
            bus,
            window_hours,
        }
    }

    pub async fn run(&self) -> JobResult<DueDateCheckResult> {
        let mut result = DueDateCheckResult::default();

        let tasks = self.get_due_tasks().await?;
        result.tasks_checked = tasks.len() as i32;

        for task in tasks {
            // Claim the task first so concurrent runs never announce it twice
            match self.mark_notified(task.id).await {
                Ok(true) => {
                    self.bus.emit(task.to_event());
                    result.events_published += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to mark task {} as notified: {}", task.id, e);
                    result
                        .errors
                        .push(format!("Failed to mark task {} as notified: {}", task.id, e));
                }
            }
        }

        info!(
            "Due date monitor: {} tasks checked, {} events published",
            result.tasks_checked, result.events_published
        );

        Ok(result)
    }

    async fn get_due_tasks(&self) -> Result<Vec<DueTask>, sqlx::Error> {
        sqlx::query_as::<_, DueTask>(
            r#"
            SELECT id, title, status, due_date, case_id, assigned_to_id
            FROM tasks
            WHERE status NOT IN ('completed', 'cancelled')
              AND due_notified_at IS NULL
              AND due_date IS NOT NULL
              AND due_date BETWEEN NOW() AND NOW() + make_interval(hours => $1)
            ORDER BY due_date ASC
            "#,
        )
        .bind(self.window_hours)
        .fetch_all(&self.db_pool)
        .await
    }

    async fn mark_notified(&self, task_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tasks SET due_notified_at = NOW() WHERE id = $1 AND due_notified_at IS NULL")
            .bind(task_id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
