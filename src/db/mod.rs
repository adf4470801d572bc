use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::ports::RepositoryError;

pub mod models;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    Ok(())
}

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(err.to_string()),
            // Never reached the server, so retrying cannot double-apply.
            sqlx::Error::PoolTimedOut => RepositoryError::Transient(err.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepositoryError::Conflict(db.message().to_string()),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    RepositoryError::Transient(db.message().to_string())
                }
                _ => RepositoryError::Database(err.to_string()),
            },
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(RepositoryError::from(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::RowNotFound),
            RepositoryError::NotFound(_)
        ));
    }

    #[test]
    fn test_io_error_is_not_retried() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!RepositoryError::from(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn test_protocol_error_is_permanent() {
        let err = RepositoryError::from(sqlx::Error::Protocol("bad frame".into()));
        assert!(!err.is_transient());
    }
}
