//! High-level pipeline: download → prepare → combine → multiplex → upload, then clean up.
//!
//! This module provides the driver that takes one [`PipelineConfig`] from remote URLs to an
//! uploaded container file:
//!   - Downloads the video and every audio track into the work directory
//!   - Ensures the output directory exists
//!   - Combines the audio tracks with the configured [`CombinePolicy`]
//!   - Stream-copies video + combined audio into the output container
//!   - Uploads the container into the configured remote folder
//!
//! # Responsibilities
//! - Strictly sequential, fail-fast orchestration: the first stage error ends the run
//! - Cleanup of every temporary file on both terminal states; the output container is kept
//! - Structured logging of each stage transition (`[PIPELINE]` tagged events)
//!
//! # Callable From
//! - The CLI crate, with production implementations of the [`crate::contract`] traits
//! - Integration tests, with mocks or local fakes
//!
//! # Error Handling
//! A failed run returns [`PipelineError`] naming the stage that failed; cleanup errors are logged
//! and never replace the primary failure.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use tracing::{error, info};

use crate::audio::CombinePolicy;
use crate::combine::AudioCombiner;
use crate::contract::{
    AudioCodec, DownloadOutcome, Downloader, Multiplexer, UploadedFile, Uploader,
};
use crate::download::file_name_from_url;
use crate::error::{OutputConflictError, PipelineError, Stage, UploadError};
use crate::fs::{ensure_dir, ScratchFiles};

/// Default name of the combined-audio intermediate inside the work directory.
pub const DEFAULT_COMBINED_AUDIO_NAME: &str = "combined_audio.mp3";

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub video_url: String,
    pub audio_urls: Vec<String>,
    /// Where downloads and the combined audio are staged.
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_file_name: String,
    pub folder_id: String,
    pub policy: CombinePolicy,
    pub combined_audio_name: String,
}

/// The collaborators a run is executed with.
pub struct Stages<'a> {
    pub downloader: &'a dyn Downloader,
    pub codec: &'a dyn AudioCodec,
    pub multiplexer: &'a dyn Multiplexer,
    pub uploader: &'a dyn Uploader,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Succeeded,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Succeeded => f.write_str("succeeded"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub output_path: PathBuf,
    pub uploaded: UploadedFile,
    pub downloads: Vec<DownloadOutcome>,
    pub combined_duration_secs: f64,
}

/// Scratch path for a downloaded asset: role prefix plus the URL's file name.
pub fn scratch_path(work_dir: &Path, role: &str, url: &str) -> PathBuf {
    match file_name_from_url(url) {
        Some(name) => work_dir.join(format!("{role}_{name}")),
        None => work_dir.join(role),
    }
}

/// Whether two paths name the same file once made absolute, ignoring `.` components.
fn same_location(a: &Path, b: &Path) -> bool {
    fn normalized(p: &Path) -> PathBuf {
        std::path::absolute(p)
            .unwrap_or_else(|_| p.to_path_buf())
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
    normalized(a) == normalized(b)
}

/// Run the whole pipeline once. Temporary files are removed before this returns, whatever the
/// outcome.
pub async fn run_pipeline(
    config: &PipelineConfig,
    stages: &Stages<'_>,
) -> Result<PipelineReport, PipelineError> {
    info!(
        video_url = %config.video_url,
        audio_tracks = config.audio_urls.len(),
        policy = ?config.policy,
        "[PIPELINE] Starting run"
    );

    let mut scratch = ScratchFiles::new();
    let result = run_stages(config, stages, &mut scratch).await;

    let state = match &result {
        Ok(report) => {
            info!(output = %report.output_path.display(), remote_id = %report.uploaded.id, "[PIPELINE] Run succeeded");
            RunState::Succeeded
        }
        Err(e) => {
            error!(stage = %e.stage, error = %e, "[PIPELINE][ERROR] Run failed");
            RunState::Failed
        }
    };

    info!(%state, files = scratch.paths().len(), "[PIPELINE] Cleaning up temporary files");
    scratch.cleanup();
    result
}

async fn run_stages(
    config: &PipelineConfig,
    stages: &Stages<'_>,
    scratch: &mut ScratchFiles,
) -> Result<PipelineReport, PipelineError> {
    let video_path = scratch_path(&config.work_dir, "video", &config.video_url);
    let audio_plan: Vec<PathBuf> = config
        .audio_urls
        .iter()
        .enumerate()
        .map(|(idx, url)| scratch_path(&config.work_dir, &format!("audio_{idx}"), url))
        .collect();
    let combined_path = config.work_dir.join(&config.combined_audio_name);
    let output_path = config.output_dir.join(&config.output_file_name);

    // --- Downloading ---
    info!(stage = %Stage::Downloading, "[PIPELINE] Entering stage");
    let planned = std::iter::once(&video_path)
        .chain(audio_plan.iter())
        .chain(std::iter::once(&combined_path));
    if let Some(clash) = planned.into_iter().find(|p| same_location(p, &output_path)) {
        error!(output = %output_path.display(), scratch = %clash.display(), "[PIPELINE][ERROR] Output would be removed by cleanup");
        return Err(PipelineError::new(
            Stage::Downloading,
            OutputConflictError {
                output: output_path.clone(),
                scratch: clash.clone(),
            },
        ));
    }
    ensure_dir(&config.work_dir).map_err(|e| PipelineError::new(Stage::Downloading, e))?;

    let mut downloads = Vec::with_capacity(1 + config.audio_urls.len());

    scratch.track(&video_path);
    info!(url = %config.video_url, path = %video_path.display(), "[PIPELINE] Downloading video");
    let outcome = stages
        .downloader
        .download(&config.video_url, &video_path)
        .await
        .map_err(|e| PipelineError::new(Stage::Downloading, e))?;
    downloads.push(outcome);

    let mut audio_paths = Vec::with_capacity(config.audio_urls.len());
    for (idx, (url, path)) in config.audio_urls.iter().zip(audio_plan).enumerate() {
        scratch.track(&path);
        info!(url = %url, track = idx + 1, path = %path.display(), "[PIPELINE] Downloading audio");
        let outcome = stages
            .downloader
            .download(url, &path)
            .await
            .map_err(|e| PipelineError::new(Stage::Downloading, e))?;
        downloads.push(outcome);
        audio_paths.push(path);
    }

    // --- Preparing ---
    info!(stage = %Stage::Preparing, "[PIPELINE] Entering stage");
    ensure_dir(&config.output_dir).map_err(|e| PipelineError::new(Stage::Preparing, e))?;

    // --- Combining ---
    info!(stage = %Stage::Combining, "[PIPELINE] Entering stage");
    scratch.track(&combined_path);
    let combiner = AudioCombiner::new(stages.codec, config.policy);
    let combined = combiner
        .combine(&audio_paths, &combined_path)
        .await
        .map_err(|e| PipelineError::new(Stage::Combining, e))?;

    // --- Multiplexing ---
    info!(stage = %Stage::Multiplexing, "[PIPELINE] Entering stage");
    stages
        .multiplexer
        .multiplex(&video_path, &combined.path, &output_path)
        .await
        .map_err(|e| PipelineError::new(Stage::Multiplexing, e))?;

    // --- Uploading ---
    info!(stage = %Stage::Uploading, "[PIPELINE] Entering stage");
    let remote_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PipelineError::new(
                Stage::Uploading,
                UploadError(format!("{} has no file name", output_path.display())),
            )
        })?;
    stages
        .uploader
        .authenticate()
        .await
        .map_err(|e| PipelineError::new(Stage::Uploading, e))?;
    let uploaded = stages
        .uploader
        .upload_file(&output_path, &remote_name, &config.folder_id)
        .await
        .map_err(|e| PipelineError::new(Stage::Uploading, e))?;
    info!(name = %uploaded.name, id = %uploaded.id, folder = %config.folder_id, "[PIPELINE] Uploaded output");

    Ok(PipelineReport {
        output_path,
        uploaded,
        downloads,
        combined_duration_secs: combined.duration_secs,
    })
}
