//! Stream-copy multiplexing with ffmpeg as a subprocess.
//!
//! ffmpeg writes into a temporary file in the output directory carrying the output's extension
//! (so ffmpeg picks the same muxer); the file is renamed onto the final path only after ffmpeg
//! exits with status 0.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info};

use crate::codec::stderr_tail;
use crate::contract::Multiplexer;
use crate::error::MultiplexError;
use crate::fs::staging_builder;

/// [`Multiplexer`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegMultiplexer {
    ffmpeg: PathBuf,
}

impl Default for FfmpegMultiplexer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegMultiplexer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Arguments for one invocation: video stream 0 of the first input, audio stream 0 of the
    /// second, both copied, overwriting `output`.
    pub fn arguments(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push("-i".into());
        args.push(video.as_os_str().to_owned());
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
        for a in [
            "-c:v", "copy", "-c:a", "copy", "-map", "0:v:0", "-map", "1:a:0", "-y",
        ] {
            args.push(a.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Multiplexer for FfmpegMultiplexer {
    async fn multiplex(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), MultiplexError> {
        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = output
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let staging = staging_builder(".muxing-", &suffix)
            .tempfile_in(&dir)
            .map_err(|e| {
                error!(error = ?e, dir = %dir.display(), "Failed to create staging file");
                MultiplexError {
                    exit_code: None,
                    message: format!("creating staging file in {}: {e}", dir.display()),
                }
            })?;

        info!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            "Running ffmpeg stream copy"
        );
        let result = Command::new(&self.ffmpeg)
            .args(Self::arguments(video, audio, staging.path()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                error!(error = ?e, ffmpeg = %self.ffmpeg.display(), "Failed to launch ffmpeg");
                return Err(MultiplexError {
                    exit_code: None,
                    message: format!("launching {}: {e}", self.ffmpeg.display()),
                });
            }
        };

        if !out.status.success() {
            let stderr = stderr_tail(&out.stderr);
            error!(
                status = %out.status,
                stderr = %stderr,
                output = %output.display(),
                "ffmpeg exited with non-zero status"
            );
            return Err(MultiplexError {
                exit_code: out.status.code(),
                message: stderr,
            });
        }

        staging.persist(output).map_err(|e| {
            error!(error = ?e.error, output = %output.display(), "Failed to move muxed file into place");
            MultiplexError {
                exit_code: Some(0),
                message: format!("renaming into {}: {}", output.display(), e.error),
            }
        })?;

        info!(output = %output.display(), "Multiplexing complete");
        Ok(())
    }
}
