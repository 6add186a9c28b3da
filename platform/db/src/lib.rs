//! Connection setup shared by the server binary and the CLI commands.

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingUrl,
    #[error("invalid {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error(transparent)]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl DatabaseSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads `DATABASE_URL` and `DB_MAX_CONNECTIONS`.
    pub fn from_env() -> DbResult<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| DbError::MissingUrl)?;
        let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => parse_max_connections(&raw)?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            url,
            max_connections,
        })
    }

    fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}

fn parse_max_connections(raw: &str) -> DbResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| DbError::InvalidSetting {
            key: "DB_MAX_CONNECTIONS",
            value: raw.to_owned(),
        })
}

/// Opens the pool. In-memory SQLite is pinned to one connection so every
/// query sees the same database.
pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let mut options = ConnectOptions::new(settings.url.clone());
    let max = if settings.is_sqlite() && settings.url.contains(":memory:") {
        1
    } else {
        settings.max_connections
    };
    options
        .max_connections(max)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let pool = Database::connect(options).await?;
    info!(backend = ?pool.get_database_backend(), max_connections = max, "database connected");
    Ok(pool)
}

/// Round-trips a trivial query.
pub async fn ping(pool: &DbPool) -> DbResult<()> {
    let backend = pool.get_database_backend();
    pool.execute(Statement::from_string(backend, "SELECT 1"))
        .await?;
    Ok(())
}
