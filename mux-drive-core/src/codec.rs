//! [`AudioCodec`] implemented on top of the `ffprobe` and `ffmpeg` command-line tools.
//!
//! Decoding asks `ffprobe` for the first audio stream's sample rate and channel count, then has
//! `ffmpeg` write that stream as raw little-endian `f32` PCM to stdout. Encoding is the reverse:
//! raw PCM is fed to `ffmpeg` on stdin and written out with the configured lossy encoder.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::audio::AudioBuffer;
use crate::contract::AudioCodec;
use crate::error::CodecError;

const STDERR_TAIL: usize = 2000;
const PCM_WRITE_SAMPLES: usize = 16 * 1024;

/// Settings for the ffmpeg-backed codec.
#[derive(Debug, Clone)]
pub struct FfmpegAudioCodec {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// ffmpeg encoder name for the intermediate file.
    pub encoder: String,
    /// ffmpeg muxer name for the intermediate file.
    pub format: String,
    pub bitrate: String,
}

impl Default for FfmpegAudioCodec {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encoder: "libmp3lame".to_string(),
            format: "mp3".to_string(),
            bitrate: "192k".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamReport {
    #[serde(default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    sample_rate: Option<String>,
    channels: Option<u16>,
}

/// Last part of a tool's stderr, lossily decoded.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

impl FfmpegAudioCodec {
    async fn stream_format(&self, path: &Path) -> Result<(u32, u16), CodecError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=sample_rate,channels",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CodecError::Tool {
                tool: self.ffprobe.display().to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let report: StreamReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| CodecError::Unsupported(format!("unreadable ffprobe output: {e}")))?;
        let stream = report
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| CodecError::Unsupported("no audio stream".into()))?;

        let sample_rate = stream
            .sample_rate
            .as_deref()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|r| *r > 0)
            .ok_or_else(|| CodecError::Unsupported("unknown sample rate".into()))?;
        let channels = stream
            .channels
            .filter(|c| *c > 0)
            .ok_or_else(|| CodecError::Unsupported("unknown channel count".into()))?;
        Ok((sample_rate, channels))
    }
}

#[async_trait]
impl AudioCodec for FfmpegAudioCodec {
    async fn decode(&self, path: &Path) -> Result<AudioBuffer, CodecError> {
        let (sample_rate, channels) = self.stream_format(path).await?;
        debug!(path = %path.display(), sample_rate, channels, "Read audio stream format");

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:a:0", "-f", "f32le", "-acodec", "pcm_f32le"])
            .args(["-ar", sample_rate.to_string().as_str()])
            .args(["-ac", channels.to_string().as_str()])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            error!(path = %path.display(), status = %output.status, stderr = %stderr, "ffmpeg decode failed");
            return Err(CodecError::Tool {
                tool: self.ffmpeg.display().to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let buffer = AudioBuffer::new(samples, sample_rate, channels);
        info!(
            path = %path.display(),
            frames = buffer.frames(),
            duration_secs = buffer.duration_secs(),
            "Decoded audio"
        );
        Ok(buffer)
    }

    async fn encode(&self, buffer: &AudioBuffer, path: &Path) -> Result<(), CodecError> {
        if buffer.sample_rate == 0 || buffer.channels == 0 {
            return Err(CodecError::Unsupported(format!(
                "cannot encode {} Hz / {} channel audio",
                buffer.sample_rate, buffer.channels
            )));
        }

        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-f", "f32le"])
            .args(["-ar", buffer.sample_rate.to_string().as_str()])
            .args(["-ac", buffer.channels.to_string().as_str()])
            .args(["-i", "pipe:0"])
            .args(["-c:a", self.encoder.as_str(), "-b:a", self.bitrate.as_str()])
            .args(["-f", self.format.as_str()])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CodecError::Unsupported("ffmpeg stdin unavailable".into()))?;

        let samples = buffer.samples.as_slice();
        let feed = async move {
            for chunk in samples.chunks(PCM_WRITE_SAMPLES) {
                let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
                stdin.write_all(&bytes).await?;
            }
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            error!(path = %path.display(), status = %output.status, stderr = %stderr, "ffmpeg encode failed");
            return Err(CodecError::Tool {
                tool: self.ffmpeg.display().to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }
        fed?;

        info!(
            path = %path.display(),
            encoder = %self.encoder,
            duration_secs = buffer.duration_secs(),
            "Encoded audio"
        );
        Ok(())
    }
}
