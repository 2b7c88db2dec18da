//! Error types for relq-sql

use relq_ir::{EvalError, TableId, ValueError};
use thiserror::Error;

/// Translation failures. Each one aborts the whole pass; no partial SQL is
/// ever handed out.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    #[error("IN list source is neither a literal, a subquery nor parameterizable: {0}")]
    NonParameterizableDynamicList(String),

    #[error("Column refers to unknown table {0}")]
    UnknownTable(TableId),
}

/// Failures while reading one row back into its result shape.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Column ordinal {ordinal} out of range ({count} columns)")]
    ColumnOutOfRange { ordinal: usize, count: usize },

    #[error("Column {ordinal}: {source}")]
    Column { ordinal: usize, source: ValueError },

    #[error("Sub-document in column {ordinal} is not valid JSON: {source}")]
    SubDocument {
        ordinal: usize,
        source: serde_json::Error,
    },

    #[error("Sub-document in column {ordinal} does not match its type: {source}")]
    SubDocumentShape { ordinal: usize, source: ValueError },

    #[error("Unbound lambda parameter {0}")]
    UnboundParameter(usize),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Failures while binding a command for execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Parameter {name}: {source}")]
    Eval { name: String, source: EvalError },

    #[error("Parameter list {name} expects a collection, got {found}")]
    NotACollection { name: String, found: &'static str },
}

/// Result type alias for TranslateError
pub type TranslateResult<T> = Result<T, TranslateError>;
