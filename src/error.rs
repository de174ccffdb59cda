use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("unknown pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read ledger: {0}")]
    LedgerRead(String),

    #[error("ledger has no column named {0:?}")]
    LedgerColumnNotFound(String),

    #[error("dataset {0} not found in ledger")]
    #[diagnostic(help("add the dataset to the ledger or fix its identifier before correcting it"))]
    LedgerRowNotFound(String),

    #[error("dataset {dataset} appears {count} times in ledger")]
    #[diagnostic(help("remove the duplicate rows; corrections are never applied to a guessed row"))]
    AmbiguousLedgerRow { dataset: String, count: usize },

    #[error("remote request failed: {0}")]
    RemoteHttp(String),

    #[error("remote returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("failed to parse metadata table: {0}")]
    MetadataParse(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("datalad {operation} failed: {message}")]
    Vcs { operation: String, message: String },

    #[error("job submission failed: {0}")]
    Scheduler(String),

    #[error("mosaic generation failed for {dataset}: {message}")]
    MosaicGeneration { dataset: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
