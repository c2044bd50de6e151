// Job Scheduler - Runs the periodic jobs that emit workflow trigger events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::due_dates::DueDateMonitorJob;
use crate::workflows::EventBus;

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub enabled: bool,
    pub due_date_check_interval_minutes: u32,
    pub due_date_window_hours: i32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            due_date_check_interval_minutes: 15,
            due_date_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

type ExecutionLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

/// Append a log, keeping only the most recent entries
async fn record_log(logs: &ExecutionLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        let excess = logs.len() - MAX_EXECUTION_LOGS;
        logs.drain(..excess);
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    db_pool: PgPool,
    bus: EventBus,
    config: JobConfig,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new(db_pool: PgPool, bus: EventBus, config: JobConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            db_pool,
            bus,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        if !self.config.enabled {
            info!("Background jobs are disabled");
            return Ok(());
        }

        info!("Starting background job scheduler");

        self.schedule_due_date_monitor().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_due_date_monitor(&self) -> JobResult<()> {
        let interval = self.config.due_date_check_interval_minutes;
        if interval == 0 || interval > 59 {
            return Err(JobError::ConfigError(format!(
                "due date check interval must be 1-59 minutes, got {}",
                interval
            )));
        }
        let cron_expr = format!("0 */{} * * * *", interval); // Every N minutes

        let db_pool = self.db_pool.clone();
        let bus = self.bus.clone();
        let window_hours = self.config.due_date_window_hours;
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let db_pool = db_pool.clone();
            let bus = bus.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log_id = Uuid::new_v4();
                let started_at = Utc::now();

                info!("Running due date monitor job");

                let monitor = DueDateMonitorJob::new(db_pool, bus, window_hours);

                let log = match monitor.run().await {
                    Ok(result) => {
                        let completed_at = Utc::now();
                        JobExecutionLog {
                            id: log_id,
                            job_name: "Due Date Monitor".to_string(),
                            started_at,
                            completed_at: Some(completed_at),
                            status: if result.errors.is_empty() {
                                JobStatus::Completed
                            } else {
                                JobStatus::PartialFailure
                            },
                            items_processed: result.events_published,
                            errors: result.errors,
                            duration_ms: Some((completed_at - started_at).num_milliseconds()),
                        }
                    }
                    Err(e) => {
                        error!("Due date monitor failed: {}", e);
                        let completed_at = Utc::now();
                        JobExecutionLog {
                            id: log_id,
                            job_name: "Due Date Monitor".to_string(),
                            started_at,
                            completed_at: Some(completed_at),
                            status: JobStatus::Failed,
                            items_processed: 0,
                            errors: vec![e.to_string()],
                            duration_ms: Some((completed_at - started_at).num_milliseconds()),
                        }
                    }
                };

                record_log(&logs, log).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled due date monitor to run every {} minutes", interval);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }
}
