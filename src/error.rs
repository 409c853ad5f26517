//! Error types for beaver-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid excursion id: {0:?}")]
    InvalidExcursionId(String),

    #[error("excursion {0} already recorded")]
    DuplicateExcursion(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::queue::Lifecycle,
        to: crate::queue::Lifecycle,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
