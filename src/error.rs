use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading configuration or the patient table.
#[derive(Error, Debug)]
pub enum StrokeError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported data file {path:?}, expected .parquet or .csv")]
    InputFormat { path: PathBuf },
    #[error("required column {column:?} missing from {path:?}")]
    MissingColumn { column: &'static str, path: PathBuf },
    #[error("patient {id}: {column} must be 0 or 1, found {value}")]
    InvalidFlag {
        column: &'static str,
        id: i64,
        value: i64,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("table load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Server(#[from] std::io::Error),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Outcomes of a query that are not a result set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("patient {id} not found")]
    NotFound { id: i64 },
    #[error("invalid patient id {raw:?}")]
    InvalidId { raw: String },
    #[error("invalid stroke flag {value}, expected 0 or 1")]
    InvalidStroke { value: i64 },
    #[error("query evaluation failed: {message}")]
    Frame { message: String },
}

impl From<PolarsError> for QueryError {
    fn from(err: PolarsError) -> Self {
        QueryError::Frame {
            message: err.to_string(),
        }
    }
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound { .. })
    }
}
