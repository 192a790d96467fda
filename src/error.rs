// src/error.rs
//! Named failure conditions of the pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required input file does not exist.
    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    /// The forecaster needs at least two distinct days of history.
    #[error("insufficient history: need at least {required} distinct days, got {got}")]
    InsufficientHistory { required: usize, got: usize },

    #[error("forecast horizon of {got} days exceeds the maximum of {max}")]
    HorizonTooLong { max: usize, got: usize },

    /// Notification transport failed. Non-fatal for the evaluation step.
    #[error("alert delivery failed: {0}")]
    DeliveryFailure(String),
}

/// Why a single row was rejected at ingestion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("row {row}: missing required column {column}")]
    MissingField { row: usize, column: &'static str },

    #[error("row {row}: cannot parse {column} from {value:?}")]
    BadValue {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: duplicate id {id}")]
    DuplicateId { row: usize, id: String },

    #[error("row {row}: {message}")]
    Unreadable { row: usize, message: String },
}

/// Why the remote classifier could not produce a verdict. Never escapes the classifier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassificationFailure {
    #[error("no API key configured for {0}")]
    MissingCredentials(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("empty response")]
    Empty,

    #[error("unparseable response: {0}")]
    Unparseable(String),
}
