/// `load_config` module: loads a static YAML config, applies environment overrides for the
/// Drive folder and credential, and maps the result into the core `PipelineConfig` plus the
/// settings the CLI needs to build the production stages.
///
/// This module is the only place where untrusted YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into private raw structs
/// - Fill in defaults (chunk size, policy, work dir, tool paths, bitrate)
/// - Inject `MUX_DRIVE_FOLDER_ID` / `MUX_DRIVE_CREDENTIALS` from the environment when set
/// - Reject configs the pipeline cannot run: no audio tracks, no folder id, a chunk size outside
///   `1..=MAX_CHUNK_SIZE`, an output or intermediate file name that is not a plain file name
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use mux_drive_core::audio::CombinePolicy;
use mux_drive_core::codec::FfmpegAudioCodec;
use mux_drive_core::download::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use mux_drive_core::pipeline::{PipelineConfig, DEFAULT_COMBINED_AUDIO_NAME};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const FOLDER_ID_ENV: &str = "MUX_DRIVE_FOLDER_ID";
pub const CREDENTIALS_ENV: &str = "MUX_DRIVE_CREDENTIALS";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Everything the `merge` command needs.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub chunk_size: usize,
    pub codec: FfmpegAudioCodec,
    pub ffmpeg: PathBuf,
    pub credentials_file: PathBuf,
    /// Overrides the Drive upload endpoint; `None` means the public API.
    pub upload_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    video_url: String,
    #[serde(default)]
    audio_urls: Vec<String>,
    #[serde(default)]
    work_dir: Option<PathBuf>,
    output: OutputSection,
    #[serde(default)]
    combine: CombineSection,
    #[serde(default)]
    download: DownloadSection,
    #[serde(default)]
    upload: UploadSection,
    #[serde(default)]
    tools: ToolsSection,
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    dir: PathBuf,
    file_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct CombineSection {
    #[serde(default)]
    policy: Option<String>,
    #[serde(default)]
    bitrate: Option<String>,
    #[serde(default)]
    intermediate_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadSection {
    #[serde(default)]
    chunk_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadSection {
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    credentials_file: Option<PathBuf>,
    #[serde(default)]
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsSection {
    #[serde(default)]
    ffmpeg: Option<PathBuf>,
    #[serde(default)]
    ffprobe: Option<PathBuf>,
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.file_name().map(|n| n == path.as_os_str()).unwrap_or(false)
}

/// Loads the YAML config at `path` and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if raw.video_url.trim().is_empty() {
        bail!("video_url must not be empty");
    }
    if raw.audio_urls.is_empty() {
        error!(config_path = ?path_ref, "No audio tracks configured");
        bail!("audio_urls must list at least one audio track");
    }
    if !is_plain_file_name(&raw.output.file_name) {
        bail!(
            "output.file_name must be a plain file name, got {:?}",
            raw.output.file_name
        );
    }

    if let Some(name) = &raw.combine.intermediate_name {
        if !is_plain_file_name(name) {
            bail!("combine.intermediate_name must be a plain file name, got {name:?}");
        }
        if name.starts_with("video_") || name.starts_with("audio_") {
            bail!("combine.intermediate_name {name:?} clashes with download file names");
        }
    }

    let policy = match raw.combine.policy.as_deref() {
        None => CombinePolicy::default(),
        Some(s) => s
            .parse::<CombinePolicy>()
            .map_err(|e| anyhow::anyhow!("Invalid combine.policy: {e}"))?,
    };

    let chunk_size = raw.download.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        bail!("download.chunk_size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {chunk_size}");
    }

    let folder_id = match env_override(FOLDER_ID_ENV) {
        Some(id) => {
            info!(env = FOLDER_ID_ENV, "Using Drive folder id from environment");
            id
        }
        None => match raw.upload.folder_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                error!(config_path = ?path_ref, "No Drive folder id configured");
                bail!("upload.folder_id is missing and {FOLDER_ID_ENV} is not set");
            }
        },
    };

    let credentials_file = env_override(CREDENTIALS_ENV)
        .map(PathBuf::from)
        .or(raw.upload.credentials_file)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE));

    let ffmpeg = raw.tools.ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg"));
    let mut codec = FfmpegAudioCodec {
        ffmpeg: ffmpeg.clone(),
        ..FfmpegAudioCodec::default()
    };
    if let Some(ffprobe) = raw.tools.ffprobe {
        codec.ffprobe = ffprobe;
    }
    if let Some(bitrate) = raw.combine.bitrate {
        codec.bitrate = bitrate;
    }

    let pipeline = PipelineConfig {
        video_url: raw.video_url,
        audio_urls: raw.audio_urls,
        work_dir: raw.work_dir.unwrap_or_else(|| PathBuf::from(".")),
        output_dir: raw.output.dir,
        output_file_name: raw.output.file_name,
        folder_id,
        policy,
        combined_audio_name: raw
            .combine
            .intermediate_name
            .unwrap_or_else(|| DEFAULT_COMBINED_AUDIO_NAME.to_string()),
    };

    info!(
        audio_tracks = pipeline.audio_urls.len(),
        policy = ?pipeline.policy,
        chunk_size,
        output_dir = ?pipeline.output_dir,
        "Configuration loaded"
    );
    Ok(CliConfig {
        pipeline,
        chunk_size,
        codec,
        ffmpeg,
        credentials_file,
        upload_endpoint: raw.upload.endpoint,
    })
}
