use thiserror::Error;

use crate::ledger::models::ChainId;

/// Top-level error type for the reconciliation core
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Client not updated: {0}")]
    ClientNotUpdated(String),

    #[error("Too many block ranges: got {ranges}, chain list has {chains}")]
    TooManyBlockRanges { ranges: usize, chains: usize },

    #[error("No block range for chain {0}")]
    MissingBlockRange(ChainId),

    #[error("No spoke pool client for chain {0}")]
    MissingSpokeClient(ChainId),

    #[error("Refund resolution failed: {0}")]
    RefundResolution(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    #[error("Invalid refund root: {0}")]
    InvalidRefundRoot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(format!("{}", error))
    }
}

impl From<hex::FromHexError> for AppError {
    fn from(error: hex::FromHexError) -> Self {
        AppError::InvalidRefundRoot(format!("{:?}", error))
    }
}

/// Result type alias for the reconciliation core
pub type AppResult<T> = Result<T, AppError>;
