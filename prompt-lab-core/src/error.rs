use thiserror::Error;

use crate::domain::run::{QueryError, RunKey};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution cancelled")]
    Cancelled,
}

/// Problems with the task dataset. Always fatal, raised before any run starts.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset: {0}")]
    Parse(String),

    #[error("record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: String },

    #[error("duplicate task id `{0}`")]
    DuplicateId(String),

    #[error("task `{id}` is invalid: {reason}")]
    Invalid { id: String, reason: String },

    #[error("dataset contains no tasks")]
    Empty,
}

/// Inconsistencies found while scoring a set of run results.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("run {0} has both an output and an error")]
    BothOutputAndError(RunKey),

    #[error("run {0} has neither an output nor an error")]
    NeitherOutputNorError(RunKey),

    #[error("run {0} appears more than once")]
    DuplicateRun(RunKey),

    #[error("run {0} refers to an unknown task")]
    UnknownTask(RunKey),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}
