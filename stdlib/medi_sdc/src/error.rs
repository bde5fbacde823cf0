use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Value;

/// Errors that stop a disclosure-control run before the table is touched.
#[derive(Debug, Error)]
pub enum SdcError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Row {row} has {found} values, expected {expected}")]
    RowArity {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdcError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        SdcError::InvalidConfig(reason.into())
    }
}

/// Non-fatal finding: a value outside the declared domain of a column.
///
/// These are passed through untouched and counted so that upstream mapping
/// bugs surface in the run report instead of aborting the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub column: String,
    pub value: Value,
    pub count: usize,
}
