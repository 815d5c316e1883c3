//! In-memory audio and the two ways of combining tracks.
//!
//! Samples are interleaved `f32` in the nominal range `[-1.0, 1.0]`. Combining buffers of
//! different shapes first conforms them all to the highest sample rate and channel count
//! present.

use serde::{Deserialize, Serialize};

/// Decoded PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples, `frames() * channels` long.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn silent(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Convert to `sample_rate` by linear interpolation.
    pub fn resampled(&self, sample_rate: u32) -> AudioBuffer {
        if sample_rate == self.sample_rate || self.frames() == 0 || self.sample_rate == 0 {
            return AudioBuffer::new(self.samples.clone(), sample_rate, self.channels);
        }
        let channels = self.channels as usize;
        let in_frames = self.frames();
        let out_frames =
            ((in_frames as u64 * sample_rate as u64) / self.sample_rate as u64) as usize;
        let step = self.sample_rate as f64 / sample_rate as f64;

        let mut out = Vec::with_capacity(out_frames * channels);
        for i in 0..out_frames {
            let pos = i as f64 * step;
            let left = (pos.floor() as usize).min(in_frames - 1);
            let right = (left + 1).min(in_frames - 1);
            let frac = (pos - left as f64) as f32;
            for ch in 0..channels {
                let a = self.samples[left * channels + ch];
                let b = self.samples[right * channels + ch];
                out.push(a + (b - a) * frac);
            }
        }
        AudioBuffer::new(out, sample_rate, self.channels)
    }

    /// Convert to `channels`: mono is duplicated, many-to-mono averages, anything else maps
    /// output channel `i` to input channel `i % n`.
    pub fn with_channels(&self, channels: u16) -> AudioBuffer {
        if channels == self.channels || self.channels == 0 {
            return AudioBuffer::new(self.samples.clone(), self.sample_rate, channels);
        }
        let src = self.channels as usize;
        let dst = channels as usize;
        let mut out = Vec::with_capacity(self.frames() * dst);
        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                out.push(frame.iter().sum::<f32>() / src as f32);
            } else {
                for ch in 0..dst {
                    out.push(frame[ch % src]);
                }
            }
        }
        AudioBuffer::new(out, self.sample_rate, channels)
    }

    fn conformed(&self, sample_rate: u32, channels: u16) -> AudioBuffer {
        self.with_channels(channels).resampled(sample_rate)
    }
}

/// How multiple audio tracks become one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// Append tracks end-to-end in input order.
    #[default]
    Concatenate,
    /// Mix tracks on top of each other starting at time zero.
    Overlay,
}

impl std::str::FromStr for CombinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "concatenate" | "concat" | "sequential" => Ok(CombinePolicy::Concatenate),
            "overlay" | "mix" => Ok(CombinePolicy::Overlay),
            other => Err(format!("unknown combine policy: {other}")),
        }
    }
}

/// Combine `buffers` under `policy`. Returns `None` for an empty input.
pub fn combine(policy: CombinePolicy, buffers: &[AudioBuffer]) -> Option<AudioBuffer> {
    let sample_rate = buffers.iter().map(|b| b.sample_rate).max()?;
    let channels = buffers.iter().map(|b| b.channels).max()?;
    let conformed: Vec<AudioBuffer> = buffers
        .iter()
        .map(|b| b.conformed(sample_rate, channels))
        .collect();

    Some(match policy {
        CombinePolicy::Concatenate => concatenate(&conformed, sample_rate, channels),
        CombinePolicy::Overlay => overlay(&conformed, sample_rate, channels),
    })
}

fn concatenate(buffers: &[AudioBuffer], sample_rate: u32, channels: u16) -> AudioBuffer {
    let total: usize = buffers.iter().map(|b| b.samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    for b in buffers {
        samples.extend_from_slice(&b.samples);
    }
    AudioBuffer::new(samples, sample_rate, channels)
}

// Mixed sums are hard-clipped to [-1, 1].
fn overlay(buffers: &[AudioBuffer], sample_rate: u32, channels: u16) -> AudioBuffer {
    let longest = buffers.iter().map(|b| b.samples.len()).max().unwrap_or(0);
    let mut samples = vec![0.0f32; longest];
    for b in buffers {
        for (acc, s) in samples.iter_mut().zip(&b.samples) {
            *acc += *s;
        }
    }
    for s in &mut samples {
        *s = s.clamp(-1.0, 1.0);
    }
    AudioBuffer::new(samples, sample_rate, channels)
}
