use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub mod conversation_repo;
pub mod message_repo;
pub mod records;
pub mod user_repo;

pub type DbPool = Pool<Sqlite>;

/// Initializes the database connection pool. In-memory databases are
/// pinned to a single connection so every query sees the same database.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };
    SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await
}

/// Applies the embedded migrations.
///
/// # Errors
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
