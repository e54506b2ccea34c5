//! Type definitions shared by the gateway layers

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::Rejection;

// ============================================================================
// Result Types
// ============================================================================

/// One returned row: column name to value, in result-set column order
pub type ResultRecord = serde_json::Map<String, serde_json::Value>;

/// All rows returned by one statement, in database order
pub type ResultSet = Vec<ResultRecord>;

/// A user table as reported by `list_tables`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
}

/// A user view as reported by `list_views`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub schema: String,
    pub name: String,
    /// `None` when the connected role cannot see the view body
    pub definition: Option<String>,
}

/// Envelope returned by the query tools
#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub row_count: usize,
    pub rows: ResultSet,
}

impl From<ResultSet> for QueryOutput {
    fn from(rows: ResultSet) -> Self {
        Self {
            row_count: rows.len(),
            rows,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Boxed driver error kept as the source of a connection failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse error category, stable across message wording changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PolicyViolation,
    BuildError,
    ConnectionError,
    ExecutionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyViolation => "policy_violation",
            Self::BuildError => "build_error",
            Self::ConnectionError => "connection_error",
            Self::ExecutionError => "execution_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a gateway operation can fail. None of them are retried.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The classifier refused the query; the database was never contacted
    #[error("query rejected: {0}")]
    Policy(Rejection),

    /// A structured table query could not be rendered
    #[error("invalid table query: {0}")]
    Build(String),

    /// The database could not be reached, authenticated against, or timed out
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The database rejected or failed a statement the classifier allowed
    #[error("execution failed: {0}")]
    Execution(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Policy(_) => ErrorKind::PolicyViolation,
            Self::Build(_) => ErrorKind::BuildError,
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Execution(_) => ErrorKind::ExecutionError,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
