use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 16,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool using application configuration.
pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from_app_config(cfg)).await
}

/// Establishes a connection pool with explicit pool settings.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Creates the `company_payments` schema if it does not exist yet.
///
/// The partial unique indexes on the Stripe correlation ids and the
/// settlement id enforce the at-most-one-record-per-gateway-id invariant at
/// the store level; NULLs stay unconstrained.
pub async fn bootstrap_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let table_sql = match backend {
        DbBackend::Postgres => {
            r#"CREATE TABLE IF NOT EXISTS company_payments (
                id UUID PRIMARY KEY,
                company_id UUID NOT NULL,
                amount NUMERIC(19, 4) NOT NULL,
                currency VARCHAR(8) NOT NULL,
                gateway VARCHAR(32) NOT NULL,
                method VARCHAR(32) NOT NULL,
                status VARCHAR(16) NOT NULL,
                stripe_checkout_session_id VARCHAR(255),
                stripe_payment_intent_id VARCHAR(255),
                payment_transaction_id VARCHAR(255),
                subscription_id UUID,
                purchased_at TIMESTAMPTZ NOT NULL
            )"#
        }
        _ => {
            r#"CREATE TABLE IF NOT EXISTS company_payments (
                id TEXT PRIMARY KEY NOT NULL,
                company_id TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                gateway TEXT NOT NULL,
                method TEXT NOT NULL,
                status TEXT NOT NULL,
                stripe_checkout_session_id TEXT,
                stripe_payment_intent_id TEXT,
                payment_transaction_id TEXT,
                subscription_id TEXT,
                purchased_at TEXT NOT NULL
            )"#
        }
    };
    db.execute(Statement::from_string(backend, table_sql.to_string()))
        .await?;

    let index_sql = [
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_company_payments_checkout_session
            ON company_payments (stripe_checkout_session_id)
            WHERE stripe_checkout_session_id IS NOT NULL"#,
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_company_payments_payment_intent
            ON company_payments (stripe_payment_intent_id)
            WHERE stripe_payment_intent_id IS NOT NULL"#,
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_company_payments_payment_txn
            ON company_payments (payment_transaction_id)
            WHERE payment_transaction_id IS NOT NULL"#,
    ];
    for sql in index_sql {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }

    info!("Database schema bootstrap complete");
    Ok(())
}
