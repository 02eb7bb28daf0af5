use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid bucket path: '{0}'")]
    InvalidBucketPath(String),

    #[error("remote object does not exist: {0}")]
    RemoteFileMissing(String),

    #[error("local file does not exist: {0}")]
    LocalFileMissing(Utf8PathBuf),

    #[error("remote object already exists, refusing to overwrite: {0}")]
    RemoteAlreadyExists(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("object store request failed: {0}")]
    StorageHttp(String),

    #[error("object store returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("{action} batch failed for {failed} of {total} files:\n{details}")]
    BatchTransfer {
        action: &'static str,
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("no inputs found matching {0}")]
    NoInputsFound(String),

    #[error("file is not marked clearly as read 1 or read 2: {0}")]
    AmbiguousReadMarker(String),

    #[error("FASTQ files cannot be matched into read 1 / read 2 pairs: {0}")]
    UnbalancedPairs(String),

    #[error("record group id '{id}' does not match the required pattern '{pattern}'")]
    InvalidRecordGroup { id: String, pattern: String },

    #[error("external tool failed: {0}")]
    ToolFailed(String),

    #[error("unrecognized job name '{0}'")]
    UnknownJob(String),

    #[error("invalid job arguments: {0}")]
    InvalidJobArguments(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
