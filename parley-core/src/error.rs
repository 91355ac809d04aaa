use thiserror::Error;

/// Persistence-layer failure taxonomy. Every variant is scoped to the
/// operation that triggered it; nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),

    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("operation not permitted")]
    Forbidden,

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
