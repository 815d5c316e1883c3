//! Error taxonomy for the merge pipeline.
//!
//! Every stage returns its own error kind; the driver wraps whichever one ended the run in a
//! [`PipelineError`] together with the [`Stage`] that was executing at the time.

use std::fmt;
use std::path::PathBuf;

/// A directory could not be created.
#[derive(Debug, thiserror::Error)]
#[error("failed to create directory {}: {source}", .path.display())]
pub struct DirectoryError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Fetching a remote asset failed.
#[derive(Debug, thiserror::Error)]
#[error("download of {url} failed: {reason}")]
pub struct DownloadError {
    pub url: String,
    pub reason: String,
}

impl DownloadError {
    pub fn new(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure inside an [`AudioCodec`](crate::contract::AudioCodec) call.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("unsupported audio: {0}")]
    Unsupported(String),
}

/// Combining the audio tracks failed. `file` names the offending input, or the
/// intermediate output when encoding failed.
#[derive(Debug, thiserror::Error)]
#[error("combining audio failed at {}: {reason}", .file.display())]
pub struct CombineError {
    pub file: PathBuf,
    pub reason: String,
}

impl CombineError {
    pub fn new(file: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

/// The transcoder could not produce the output container.
/// `exit_code` is `None` when the process could not be started or was killed by a signal.
#[derive(Debug, thiserror::Error)]
#[error("multiplexing failed (exit code {}): {message}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
pub struct MultiplexError {
    pub exit_code: Option<i32>,
    pub message: String,
}

/// The stored credential was missing, unreadable, or rejected.
#[derive(Debug, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// The upload itself failed after authentication.
#[derive(Debug, thiserror::Error)]
#[error("upload failed: {0}")]
pub struct UploadError(pub String);

/// The output container would land on one of the run's temporary files.
#[derive(Debug, thiserror::Error)]
#[error("output {} collides with temporary file {}", .output.display(), .scratch.display())]
pub struct OutputConflictError {
    pub output: PathBuf,
    pub scratch: PathBuf,
}

/// Union of the stage error kinds.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Combine(#[from] CombineError),
    #[error(transparent)]
    Multiplex(#[from] MultiplexError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    OutputConflict(#[from] OutputConflictError),
}

/// Forward states of the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Preparing,
    Combining,
    Multiplexing,
    Uploading,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Downloading => "downloading",
            Stage::Preparing => "preparing",
            Stage::Combining => "combining",
            Stage::Multiplexing => "multiplexing",
            Stage::Uploading => "uploading",
        };
        f.write_str(name)
    }
}

/// A failed run: the stage that was executing and the error it raised.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: impl Into<StageError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}
