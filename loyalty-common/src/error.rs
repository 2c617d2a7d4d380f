// ================================================================
// File: loyalty-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Business-rule violations returned to the direct caller:
    #[error("redeem is on cooldown")]
    RedeemInCooldown,

    #[error("goal not found")]
    GoalNotFound,

    #[error("goal already reached")]
    GoalAlreadyReached,

    #[error("redeem not found")]
    RedeemNotFound,

    #[error("not enough points (have {balance}, need {price})")]
    InsufficientBalance { balance: i64, price: i64 },

    /// A key was read as a JSON object but holds an empty string (or is unset).
    #[error("empty key: {0}")]
    EmptyKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Error reply sent back by the key-value hub.
    #[error("{error}: {details}")]
    Kv { error: String, details: String },

    /// A response was received that doesn't match any expected outcome.
    #[error("unknown error")]
    Unknown,

    #[error("state store is closed")]
    StoreClosed,

    #[error("module not registered: {0}")]
    MissingModule(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the business-rule variants that callers are expected to handle.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::RedeemInCooldown
                | Error::GoalNotFound
                | Error::GoalAlreadyReached
                | Error::RedeemNotFound
                | Error::InsufficientBalance { .. }
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::StoreClosed
    }
}
