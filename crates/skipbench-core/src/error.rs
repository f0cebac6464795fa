use std::path::PathBuf;
use thiserror::Error;

/// Why a single call into the subject could not produce a usable record.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("entry point unavailable: {0}")]
    Unavailable(String),
    #[error("subject terminated abnormally: {0}")]
    Abnormal(String),
    #[error("impossible record: {0}")]
    ImpossibleRecord(String),
    #[error("argument out of range for the foreign call: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invocation failed for {key} at {point}: {source}")]
    Invocation {
        key: String,
        point: String,
        #[source]
        source: InvocationError,
    },
    #[error("no raw log rows for {}", path.display())]
    MissingRawLog { path: PathBuf },
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
