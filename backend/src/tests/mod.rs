
// Common test utilities and shared test setup
use sqlx::PgPool;

/// A migrated PostgreSQL database for the `#[ignore]`d store tests
pub struct TestContext {
    pub db_pool: PgPool,
}

impl TestContext {
    pub async fn new() -> Self {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a disposable PostgreSQL database");

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let ctx = Self { db_pool: pool };
        ctx.cleanup().await;
        ctx
    }

    pub async fn cleanup(&self) {
        let tables = [
            "workflow_executions",
            "workflow_steps",
            "workflows",
            "documents",
            "tasks",
            "cases",
            "contacts",
        ];

        for table in tables {
            sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", table))
                .execute(&self.db_pool)
                .await
                .expect("Failed to truncate test table");
        }
    }
}
