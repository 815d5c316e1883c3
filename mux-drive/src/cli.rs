/// # mux-drive CLI Interface (Module)
///
/// Command parsing and the glue that wires production stage implementations into the core
/// pipeline driver.
///
/// All pipeline logic (downloading, combining, multiplexing, cleanup) lives in the
/// [`mux-drive-core`] crate; this module only builds the collaborators from configuration and
/// reports the outcome.
///
/// ## How To Use
/// - For command-line users: `mux-drive merge --config merge.yaml`, or `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`mux-drive-core`]: ../../mux-drive-core/
use crate::load_config::load_config;
use crate::upload::DriveClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use mux_drive_core::download::HttpDownloader;
use mux_drive_core::mux::FfmpegMultiplexer;
use mux_drive_core::pipeline::{run_pipeline, Stages};
use std::path::PathBuf;

/// CLI for mux-drive: merge remote video and audio tracks and publish the result to Drive.
#[derive(Parser)]
#[clap(
    name = "mux-drive",
    version,
    about = "Download a video and its audio tracks, mux them into one file and upload it to Google Drive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download, combine, multiplex and upload pipeline described by a config file
    Merge {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Merge { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "merge", "Starting merge pipeline");

            let downloader = HttpDownloader::new(config.chunk_size)
                .with_progress(|progress| tracing::info!("{progress}"));
            let multiplexer = FfmpegMultiplexer::new(config.ffmpeg.clone());
            let mut uploader = DriveClient::new(config.credentials_file.clone());
            if let Some(endpoint) = &config.upload_endpoint {
                uploader = uploader.with_upload_endpoint(endpoint.clone());
            }
            let stages = Stages {
                downloader: &downloader,
                codec: &config.codec,
                multiplexer: &multiplexer,
                uploader: &uploader,
            };

            match run_pipeline(&config.pipeline, &stages).await {
                Ok(report) => {
                    tracing::info!(
                        command = "merge",
                        output = %report.output_path.display(),
                        remote_id = %report.uploaded.id,
                        remote_name = %report.uploaded.name,
                        combined_duration_secs = report.combined_duration_secs,
                        "Merge complete"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "merge", stage = %e.stage, error = %e, "Merge failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
