//! Error types for rights ledger operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which kind of value a decoder was asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Condition,
    Fulfillment,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Condition => write!(f, "condition"),
            Expected::Fulfillment => write!(f, "fulfillment"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Malformed construction arguments: {0}")]
    Construction(String),

    #[error("Invalid {expected} encoding: {reason}")]
    Encoding { expected: Expected, reason: String },

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Ledger lookup failed: {0}")]
    Lookup(String),

    /// The ledger was reached and refused to commit the transaction
    #[error("Rejected by ledger: {0}")]
    Rejected(String),

    #[error("Transaction is not fulfilled: {0}")]
    FulfillmentMismatch(String),

    #[error("Amounts not conserved: consumed {consumed}, created {created}")]
    Conservation { consumed: u64, created: u64 },
}

impl LedgerError {
    pub(crate) fn encoding(expected: Expected, reason: impl Into<String>) -> Self {
        LedgerError::Encoding { expected, reason: reason.into() }
    }
}

/// Failures reported by a ledger gateway implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Written but not yet readable; callers may retry.
    #[error("not yet visible: {0}")]
    NotYetVisible(String),

    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("request exceeded timeout of {0:?}")]
    Timeout(Duration),

    #[error("rejected by ledger: {0}")]
    Rejected(String),
}

impl From<GatewayError> for LedgerError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(reason) => LedgerError::Rejected(reason),
            other => LedgerError::Lookup(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
