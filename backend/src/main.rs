use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod pagination;
mod services;
mod validation;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationParams};

use services::{CrmRecordService, EmailService};
use workflows::{
    Collaborators, EventBus, ExecutionStore, PgExecutionStore, PgWorkflowStore, StepInterpreter, WorkflowEngine,
    WorkflowStore,
};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub workflows: Arc<dyn WorkflowStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub bus: EventBus,
    pub db_pool: Option<sqlx::PgPool>,
}

/// Routes shared by the server and the router tests
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Mint Workflow Automation API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/events", handlers::event_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let email = match EmailService::new(&config.smtp) {
        Ok(service) => service,
        Err(e) => {
            tracing::warn!("Failed to initialize SMTP transport, email steps will fail: {}", e);
            EmailService::unconfigured()
        }
    };
    let records = Arc::new(CrmRecordService::new(db_pool.clone()));
    let collaborators = Collaborators {
        tasks: records.clone(),
        email: Arc::new(email),
        records: records.clone(),
        documents: records,
    };

    let workflow_store: Arc<dyn WorkflowStore> = Arc::new(PgWorkflowStore::new(db_pool.clone()));
    let execution_store: Arc<dyn ExecutionStore> = Arc::new(PgExecutionStore::new(db_pool.clone()));
    let engine = WorkflowEngine::new(
        workflow_store.clone(),
        execution_store.clone(),
        StepInterpreter::new(collaborators),
    );
    let (bus, dispatcher) = EventBus::start(engine.clone());

    let mut scheduler = jobs::JobScheduler::new(db_pool.clone(), bus.clone(), config.jobs.clone()).await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        workflows: workflow_store,
        executions: execution_store,
        bus,
        db_pool: Some(db_pool),
    });

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Job scheduler did not shut down cleanly: {}", e);
    }
    let runs = scheduler.get_execution_logs().await.len();
    tracing::info!("Job scheduler stopped after {} recorded runs", runs);

    // Let queued events reach the engine, then let their runs finish
    drop(scheduler);
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        if let Err(e) = dispatcher.await {
            tracing::error!("Event dispatcher panicked: {}", e);
        }
        engine.drain().await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            "Shutdown timed out with {} workflow execution(s) still running",
            engine.running()
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
