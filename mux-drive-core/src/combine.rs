//! Audio combiner: decode every downloaded track, combine them under the configured policy and
//! write a single intermediate file for the multiplexer.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::audio::{combine, AudioBuffer, CombinePolicy};
use crate::contract::AudioCodec;
use crate::error::CombineError;
use crate::fs::staging_builder;

/// What the combiner produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
}

pub struct AudioCombiner<'a> {
    codec: &'a dyn AudioCodec,
    policy: CombinePolicy,
}

impl<'a> AudioCombiner<'a> {
    pub fn new(codec: &'a dyn AudioCodec, policy: CombinePolicy) -> Self {
        Self { codec, policy }
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    /// Combine `inputs` (in order) into `output`.
    ///
    /// The encoded result is written to a temporary file next to `output` and renamed onto it
    /// only once encoding succeeded, so a failed run never leaves a half-written intermediate.
    pub async fn combine(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<CombinedAudio, CombineError> {
        if inputs.is_empty() {
            error!("No audio inputs given to combiner");
            return Err(CombineError::new(output, "no audio inputs"));
        }
        info!(
            policy = ?self.policy,
            inputs = inputs.len(),
            output = %output.display(),
            "Combining audio tracks"
        );

        let mut buffers: Vec<AudioBuffer> = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.codec.decode(input).await {
                Ok(buffer) => {
                    debug!(
                        file = %input.display(),
                        sample_rate = buffer.sample_rate,
                        channels = buffer.channels,
                        duration_secs = buffer.duration_secs(),
                        "Decoded input track"
                    );
                    buffers.push(buffer);
                }
                Err(e) => {
                    error!(error = ?e, file = %input.display(), "Failed to decode audio input");
                    return Err(CombineError::new(input, e));
                }
            }
        }

        // One input is re-encoded as is, whatever the policy.
        let combined = if buffers.len() == 1 {
            buffers.swap_remove(0)
        } else {
            combine(self.policy, &buffers)
                .ok_or_else(|| CombineError::new(output, "no audio inputs"))?
        };
        drop(buffers);

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staging = staging_builder(".combining-", "")
            .tempfile_in(&dir)
            .map_err(|e| {
                error!(error = ?e, dir = %dir.display(), "Failed to create staging file");
                CombineError::new(output, e)
            })?;

        if let Err(e) = self.codec.encode(&combined, staging.path()).await {
            error!(error = ?e, output = %output.display(), "Failed to encode combined audio");
            return Err(CombineError::new(output, e));
        }

        staging.persist(output).map_err(|e| {
            error!(error = ?e.error, output = %output.display(), "Failed to move combined audio into place");
            CombineError::new(output, e.error)
        })?;

        info!(
            output = %output.display(),
            duration_secs = combined.duration_secs(),
            "Combined audio written"
        );
        Ok(CombinedAudio {
            path: output.to_path_buf(),
            duration_secs: combined.duration_secs(),
        })
    }
}
