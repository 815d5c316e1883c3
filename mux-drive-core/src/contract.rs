#![allow(unused)]

//! # contract: the seams of the merge pipeline
//!
//! Each external collaborator of the pipeline sits behind one trait defined here:
//!
//! - [`Downloader`]: fetch a URL to a local path.
//! - [`AudioCodec`]: decode an audio file into an [`AudioBuffer`] and encode one back out.
//! - [`Multiplexer`]: stream-copy a video and an audio file into one container.
//! - [`Uploader`]: authenticate and push a local file into a remote folder.
//!
//! The driver in [`crate::pipeline`] only ever talks to these traits, so a different
//! transcoder, codec backend or storage provider can be swapped in without touching it.
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall`; the generated `Mock*` types are exported under the
//!   default `test-export-mocks` feature so downstream crates can use them in their own tests.
//!
//! ## Error Handling
//! - Every method returns the taxonomy kind for its stage (see [`crate::error`]); implementors
//!   convert their own library failures into it and log before returning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::audio::AudioBuffer;
use crate::error::{AuthError, CodecError, DownloadError, MultiplexError, UploadError};

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// The URL that was fetched.
    pub url: String,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Total bytes written to `path`.
    pub bytes_written: u64,
    /// Content length announced by the server, if any.
    pub content_length: Option<u64>,
}

/// Handle to a file stored remotely after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
}

/// Fetches one remote resource to a local file, overwriting it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`. On failure any partially written file is left in place.
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, DownloadError>;
}

/// Audio decode/encode backend used by the combiner.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AudioCodec: Send + Sync {
    /// Decode the whole file into memory.
    async fn decode(&self, path: &Path) -> Result<AudioBuffer, CodecError>;

    /// Encode `buffer` into `path` using the codec's intermediate (lossy) format.
    async fn encode(&self, buffer: &AudioBuffer, path: &Path) -> Result<(), CodecError>;
}

/// Combines a video file and an audio file into one container without re-encoding.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Write `output` holding video stream 0 of `video` and audio stream 0 of `audio`.
    /// `output` must either be complete or absent when this returns.
    async fn multiplex(&self, video: &Path, audio: &Path, output: &Path)
        -> Result<(), MultiplexError>;
}

/// Uploads files into a cloud storage folder.
///
/// `authenticate` must succeed before `upload_file` is called; the uploader never deletes or
/// modifies the local file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Load the stored credential and establish a session.
    async fn authenticate(&self) -> Result<(), AuthError>;

    /// Upload `local_path` into `folder_id` under `remote_name`.
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        folder_id: &str,
    ) -> Result<UploadedFile, UploadError>;
}
