// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Program audio sources feeding the multiplex composer.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use fmsim_core::{SimError, SimResult};
use hound::{SampleFormat, WavReader};
use tracing::debug;

// ---------------------------------------------------------------------------
// Program source abstraction
// ---------------------------------------------------------------------------

/// Interleaved audio at a fixed rate (WAV file or synthetic silence).
pub trait ProgramSource: Send + 'static {
    fn channels(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Read whole interleaved frames into `buf`.
    /// Returns the number of samples written; 0 means end of stream.
    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String>;
    /// Restart from the first frame.
    fn rewind(&mut self) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Silence
// ---------------------------------------------------------------------------

/// Source that produces silence. Stereo by default, so the multiplex still
/// carries the pilot tone.
#[derive(Debug, Clone)]
pub struct SilentSource {
    channels: usize,
    sample_rate: u32,
}

impl SilentSource {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }
}

impl Default for SilentSource {
    fn default() -> Self {
        Self::new(2, 44_100)
    }
}

impl ProgramSource for SilentSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String> {
        let n = buf.len() / self.channels * self.channels;
        buf[..n].fill(0.0);
        Ok(n)
    }

    fn rewind(&mut self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WAV file
// ---------------------------------------------------------------------------

/// WAV file source. Integer PCM is scaled to ±1.
pub struct WavSource {
    path: PathBuf,
    reader: WavReader<BufReader<File>>,
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
    int_scale: f32,
}

impl WavSource {
    pub fn open(path: &Path) -> SimResult<Self> {
        let reader = WavReader::open(path)
            .map_err(|e| SimError::Io(path.to_path_buf(), e.to_string()))?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(SimError::Io(
                path.to_path_buf(),
                "WAV header declares no channels or zero sample rate".into(),
            ));
        }
        debug!(
            "Opened {}: {} Hz, {} channel(s), {} bit {:?}",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.sample_format
        );
        let int_scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            channels: usize::from(spec.channels),
            sample_rate: spec.sample_rate,
            format: spec.sample_format,
            int_scale,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgramSource for WavSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_into(&mut self, buf: &mut [f32]) -> Result<usize, String> {
        let want = buf.len() / self.channels * self.channels;
        let mut n = 0;
        match self.format {
            SampleFormat::Float => {
                for (slot, s) in buf[..want].iter_mut().zip(self.reader.samples::<f32>()) {
                    let v = s.map_err(|e| e.to_string())?;
                    if !v.is_finite() {
                        return Err(format!("non-finite sample in {}", self.path.display()));
                    }
                    *slot = v;
                    n += 1;
                }
            }
            SampleFormat::Int => {
                let scale = self.int_scale;
                for (slot, s) in buf[..want].iter_mut().zip(self.reader.samples::<i32>()) {
                    *slot = s.map_err(|e| e.to_string())? as f32 * scale;
                    n += 1;
                }
            }
        }
        // A truncated final frame is dropped.
        Ok(n / self.channels * self.channels)
    }

    fn rewind(&mut self) -> Result<(), String> {
        self.reader.seek(0).map_err(|e| e.to_string())
    }
}
