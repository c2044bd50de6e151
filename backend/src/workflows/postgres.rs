// PostgreSQL stores for workflow definitions and execution history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use mint_shared::{ConditionGroup, ExecutionStatus, ResultData, StepRecord, Workflow, WorkflowExecution, WorkflowStep};

use super::error::{WorkflowError, WorkflowResult};
use super::store::{
    normalize_conditions, ExecutionStore, NewStep, NewWorkflow, StepUpdate, WorkflowFilter, WorkflowOrdering,
    WorkflowStore, WorkflowUpdate,
};
use crate::pagination::{search_pattern, QueryBuilder};

const WORKFLOW_COLUMNS: &str =
    "id, name, description, is_active, trigger_event, conditions, created_by, created_at, updated_at";
const STEP_COLUMNS: &str = "id, workflow_id, name, step_type, step_order, parameters, is_active";
const EXECUTION_COLUMNS: &str =
    "id, workflow_id, status, trigger_event, trigger_data, result_data, started_at, completed_at";

#[derive(FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: String,
    is_active: bool,
    trigger_event: String,
    conditions: Option<Json<ConditionGroup>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Workflow {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            trigger_event: row.trigger_event,
            conditions: row.conditions.map(|c| c.0),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct StepRow {
    id: Uuid,
    workflow_id: Uuid,
    name: String,
    step_type: String,
    step_order: i32,
    parameters: serde_json::Value,
    is_active: bool,
}

impl TryFrom<StepRow> for WorkflowStep {
    type Error = WorkflowError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(WorkflowStep {
            id: row.id,
            workflow_id: row.workflow_id,
            name: row.name,
            step_type: row.step_type.parse().map_err(WorkflowError::Corrupt)?,
            order: row.step_order,
            parameters: row.parameters,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    status: String,
    trigger_event: String,
    trigger_data: serde_json::Value,
    result_data: Json<ResultData>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = WorkflowError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(WorkflowExecution {
            id: row.id,
            workflow_id: row.workflow_id,
            status: row.status.parse().map_err(WorkflowError::Corrupt)?,
            trigger_event: row.trigger_event,
            trigger_data: row.trigger_data,
            result_data: row.result_data.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn steps_from_rows(rows: Vec<StepRow>) -> WorkflowResult<Vec<WorkflowStep>> {
    rows.into_iter().map(WorkflowStep::try_from).collect()
}

/// Map a unique-constraint violation on (workflow_id, step_order)
fn step_write_error(e: sqlx::Error, workflow_id: Uuid, order: i32) -> WorkflowError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => WorkflowError::DuplicateStepOrder { workflow_id, order },
        _ => WorkflowError::Database(e),
    }
}

async fn insert_step<'e, E>(executor: E, workflow_id: Uuid, input: NewStep) -> WorkflowResult<WorkflowStep>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, StepRow>(&format!(
        r#"
        INSERT INTO workflow_steps (id, workflow_id, name, step_type, step_order, parameters, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        STEP_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(&input.name)
    .bind(input.step_type.as_str())
    .bind(input.order)
    .bind(&input.parameters)
    .bind(input.is_active)
    .fetch_one(executor)
    .await
    .map_err(|e| step_write_error(e, workflow_id, input.order))?;

    row.try_into()
}

#[derive(Clone)]
pub struct PgWorkflowStore {
    db_pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn ensure_workflow(&self, id: Uuid) -> WorkflowResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflows WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.db_pool)
            .await?;

        if exists {
            Ok(())
        } else {
            Err(WorkflowError::WorkflowNotFound(id))
        }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn find_active_workflows(&self, event_name: &str) -> WorkflowResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE is_active = true AND trigger_event = $1 ORDER BY created_at ASC",
            WORKFLOW_COLUMNS
        ))
        .bind(event_name)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Workflow::from).collect())
    }

    async fn get_steps(&self, workflow_id: Uuid) -> WorkflowResult<Vec<WorkflowStep>> {
        let rows = sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {} FROM workflow_steps WHERE workflow_id = $1 AND is_active = true ORDER BY step_order ASC",
            STEP_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_all(&self.db_pool)
        .await?;

        steps_from_rows(rows)
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<(Vec<Workflow>, i64)> {
        let mut qb = QueryBuilder::new();
        qb.add_optional("is_active = {}", &filter.is_active);
        qb.add_optional("trigger_event = {}", &filter.trigger_event);
        qb.add_optional("(name ILIKE {} OR description ILIKE {})", &filter.search);
        let where_clause = qb.where_clause();

        let order_by = match filter.ordering {
            WorkflowOrdering::CreatedAtDesc => "created_at DESC",
            WorkflowOrdering::CreatedAt => "created_at ASC",
            WorkflowOrdering::Name => "name ASC",
            WorkflowOrdering::NameDesc => "name DESC",
        };

        let count_sql = format!("SELECT COUNT(*) FROM workflows {}", where_clause);
        let list_sql = format!(
            "SELECT {} FROM workflows {} ORDER BY {} LIMIT ${} OFFSET ${}",
            WORKFLOW_COLUMNS,
            where_clause,
            order_by,
            qb.param_count() + 1,
            qb.param_count() + 2
        );

        let pattern = filter.search.as_deref().map(search_pattern);

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query_as::<_, WorkflowRow>(&list_sql);
        if let Some(active) = filter.is_active {
            count_query = count_query.bind(active);
            list_query = list_query.bind(active);
        }
        if let Some(trigger) = &filter.trigger_event {
            count_query = count_query.bind(trigger);
            list_query = list_query.bind(trigger);
        }
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern);
            list_query = list_query.bind(pattern);
        }

        let total = count_query.fetch_one(&self.db_pool).await?;
        let rows = list_query
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db_pool)
            .await?;

        Ok((rows.into_iter().map(Workflow::from).collect(), total))
    }

    async fn get_workflow(&self, id: Uuid) -> WorkflowResult<Workflow> {
        sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {} FROM workflows WHERE id = $1", WORKFLOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(Workflow::from)
            .ok_or(WorkflowError::WorkflowNotFound(id))
    }

    async fn create_workflow(&self, input: NewWorkflow) -> WorkflowResult<Workflow> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            INSERT INTO workflows (id, name, description, is_active, trigger_event, conditions, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING {}
            "#,
            WORKFLOW_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.is_active)
        .bind(&input.trigger_event)
        .bind(normalize_conditions(input.conditions).map(Json))
        .bind(input.created_by)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(row.into())
    }

    async fn update_workflow(&self, id: Uuid, update: WorkflowUpdate) -> WorkflowResult<Workflow> {
        let replace_conditions = update.conditions.is_some();
        sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            UPDATE workflows SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                trigger_event = COALESCE($4, trigger_event),
                is_active = COALESCE($5, is_active),
                conditions = CASE WHEN $6 THEN $7 ELSE conditions END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            WORKFLOW_COLUMNS
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.trigger_event)
        .bind(update.is_active)
        .bind(replace_conditions)
        .bind(normalize_conditions(update.conditions).map(Json))
        .fetch_optional(&self.db_pool)
        .await?
        .map(Workflow::from)
        .ok_or(WorkflowError::WorkflowNotFound(id))
    }

    async fn delete_workflow(&self, id: Uuid) -> WorkflowResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::WorkflowNotFound(id));
        }
        Ok(())
    }

    async fn list_steps(&self, workflow_id: Uuid) -> WorkflowResult<Vec<WorkflowStep>> {
        self.ensure_workflow(workflow_id).await?;

        let rows = sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {} FROM workflow_steps WHERE workflow_id = $1 ORDER BY step_order ASC",
            STEP_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_all(&self.db_pool)
        .await?;

        steps_from_rows(rows)
    }

    async fn create_step(&self, workflow_id: Uuid, input: NewStep) -> WorkflowResult<WorkflowStep> {
        self.ensure_workflow(workflow_id).await?;
        insert_step(&self.db_pool, workflow_id, input).await
    }

    async fn create_steps(&self, workflow_id: Uuid, inputs: Vec<NewStep>) -> WorkflowResult<Vec<WorkflowStep>> {
        self.ensure_workflow(workflow_id).await?;

        let mut tx = self.db_pool.begin().await?;
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            // Dropping the transaction on error rolls back the earlier inserts
            created.push(insert_step(&mut *tx, workflow_id, input).await?);
        }
        tx.commit().await?;

        Ok(created)
    }

    async fn update_step(&self, workflow_id: Uuid, step_id: Uuid, update: StepUpdate) -> WorkflowResult<WorkflowStep> {
        let order = update.order.unwrap_or_default();
        let row = sqlx::query_as::<_, StepRow>(&format!(
            r#"
            UPDATE workflow_steps SET
                name = COALESCE($3, name),
                step_type = COALESCE($4, step_type),
                step_order = COALESCE($5, step_order),
                parameters = COALESCE($6, parameters),
                is_active = COALESCE($7, is_active)
            WHERE id = $1 AND workflow_id = $2
            RETURNING {}
            "#,
            STEP_COLUMNS
        ))
        .bind(step_id)
        .bind(workflow_id)
        .bind(update.name)
        .bind(update.step_type.map(|k| k.as_str()))
        .bind(update.order)
        .bind(update.parameters)
        .bind(update.is_active)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| step_write_error(e, workflow_id, order))?
        .ok_or(WorkflowError::StepNotFound(step_id))?;

        row.try_into()
    }

    async fn delete_step(&self, workflow_id: Uuid, step_id: Uuid) -> WorkflowResult<()> {
        let result = sqlx::query("DELETE FROM workflow_steps WHERE id = $1 AND workflow_id = $2")
            .bind(step_id)
            .bind(workflow_id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::StepNotFound(step_id));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgExecutionStore {
    db_pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn current_status(&self, id: Uuid) -> WorkflowResult<ExecutionStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM workflow_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        status
            .ok_or(WorkflowError::ExecutionNotFound(id))?
            .parse()
            .map_err(WorkflowError::Corrupt)
    }

    /// Conditional update: only rows in a status allowed to move to `to` are touched
    async fn transition(&self, id: Uuid, to: ExecutionStatus, error: Option<String>) -> WorkflowResult<()> {
        let allowed_from: Vec<String> = [ExecutionStatus::Pending, ExecutionStatus::Running]
            .into_iter()
            .filter(|from| from.can_transition_to(to))
            .map(|from| from.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE workflow_executions SET
                status = $2,
                completed_at = CASE WHEN $3 THEN NOW() ELSE completed_at END,
                result_data = CASE
                    WHEN $4::text IS NULL THEN result_data
                    ELSE jsonb_set(result_data, '{error}', to_jsonb($4::text))
                END
            WHERE id = $1 AND status = ANY($5)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(to.is_terminal())
        .bind(error)
        .bind(&allowed_from)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(WorkflowError::InvalidTransition { id, from, to });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(
        &self,
        workflow_id: Uuid,
        trigger_event: &str,
        trigger_data: serde_json::Value,
    ) -> WorkflowResult<WorkflowExecution> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            INSERT INTO workflow_executions (id, workflow_id, status, trigger_event, trigger_data, result_data, started_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, NOW())
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(trigger_event)
        .bind(&trigger_data)
        .bind(Json(ResultData::default()))
        .fetch_one(&self.db_pool)
        .await?;

        row.try_into()
    }

    async fn mark_running(&self, id: Uuid) -> WorkflowResult<()> {
        self.transition(id, ExecutionStatus::Running, None).await
    }

    async fn append_step(&self, id: Uuid, record: &StepRecord) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET result_data = jsonb_set(result_data, '{steps}', (result_data->'steps') || jsonb_build_array($2::jsonb))
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(Json(record))
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from one that is not running
            self.current_status(id).await?;
            return Err(WorkflowError::NotRunning(id));
        }
        Ok(())
    }

    async fn finish(&self, id: Uuid, status: ExecutionStatus, error: Option<String>) -> WorkflowResult<()> {
        if !status.is_terminal() {
            let from = self.current_status(id).await?;
            return Err(WorkflowError::InvalidTransition { id, from, to: status });
        }
        self.transition(id, status, error).await
    }

    async fn get(&self, id: Uuid) -> WorkflowResult<WorkflowExecution> {
        sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(WorkflowError::ExecutionNotFound(id))?
        .try_into()
    }

    async fn list_for_workflow(
        &self,
        workflow_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> WorkflowResult<(Vec<WorkflowExecution>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_one(&self.db_pool)
            .await?;

        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {} FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at DESC LIMIT $2 OFFSET $3",
            EXECUTION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let executions = rows
            .into_iter()
            .map(WorkflowExecution::try_from)
            .collect::<WorkflowResult<Vec<_>>>()?;

        Ok((executions, total))
    }
}
