//! Error types for the eligibility engine

use thiserror::Error;

/// Eligibility engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Rule configuration out of range
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
