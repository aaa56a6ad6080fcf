// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Multiplex (MPX) synthesis: RDS + audio sum + stereo difference + pilot.
//!
//! Output is at 228 kHz with a nominal peak near 10; callers scale it down
//! before modulation.

use std::path::PathBuf;

use fmsim_core::constants::BASE_SAMPLE_RATE;
use fmsim_core::{SimError, SimResult};
use fmsim_dsp::filter_design::{design, DesignParams, FilterType};
use fmsim_dsp::FirFilter;
use fmsim_rds::RdsEncoder;
use tracing::{debug, warn};

use crate::audio::ProgramSource;

const AUDIO_FILTER_TAPS: usize = 59;
const AUDIO_FILTER_ATTEN_DB: f64 = 50.0;
const AUDIO_FILTER_TRANSITION: f64 = 0.05;
const AUDIO_CUTOFF_HZ: f64 = 12_000.0;
const AUDIO_LEVEL: f32 = 4.05;
const PILOT_LEVEL: f32 = 0.9;

/// 19 kHz pilot over one period at 228 kHz.
const CARRIER_19: [f32; 12] = [
    0.0, 0.5, 0.866_025_4, 1.0, 0.866_025_4, 0.5, 0.0, -0.5, -0.866_025_4, -1.0, -0.866_025_4,
    -0.5,
];
/// 38 kHz stereo subcarrier, phase locked to the pilot.
const CARRIER_38: [f32; 6] = [0.0, 0.866_025_4, 0.866_025_4, 0.0, -0.866_025_4, -0.866_025_4];

/// Audio lowpass: 12 kHz, or 80 % of the source Nyquist when that is lower.
fn audio_filter(source_rate: u32) -> Vec<f32> {
    let nyquist = f64::from(source_rate) / 2.0;
    let cutoff = if nyquist < AUDIO_CUTOFF_HZ {
        nyquist * 0.8
    } else {
        AUDIO_CUTOFF_HZ
    };
    debug!("Audio lowpass cutoff {:.1} Hz", cutoff);
    design(
        FilterType::Lowpass,
        DesignParams::lowpass(
            AUDIO_FILTER_ATTEN_DB,
            AUDIO_FILTER_TRANSITION,
            cutoff / f64::from(BASE_SAMPLE_RATE),
        )
        .with_tap_limits(AUDIO_FILTER_TAPS, AUDIO_FILTER_TAPS),
    )
}

pub struct MpxComposer {
    label: PathBuf,
    source: Box<dyn ProgramSource>,
    rds: RdsEncoder,
    channels: usize,
    audio: Vec<f32>,
    /// Index of the current frame in `audio`.
    audio_index: usize,
    /// Samples left in `audio` after the current frame.
    audio_left: usize,
    /// Output samples per source frame.
    hold: f64,
    audio_pos: f64,
    sum_filter: FirFilter<f32>,
    diff_filter: FirFilter<f32>,
    pilot_phase: usize,
    stereo_phase: usize,
}

impl MpxComposer {
    /// `label` names the source in errors; `block_size` sets how much audio
    /// is pulled from the source at a time.
    pub fn new(
        label: impl Into<PathBuf>,
        source: Box<dyn ProgramSource>,
        rds: RdsEncoder,
        block_size: usize,
    ) -> Self {
        let channels = source.channels().max(1);
        let rate = source.sample_rate().max(1);
        let taps = audio_filter(rate);
        let hold = f64::from(BASE_SAMPLE_RATE) / f64::from(rate);
        Self {
            label: label.into(),
            source,
            rds,
            channels,
            audio: vec![0.0; block_size.max(1) * channels],
            audio_index: 0,
            audio_left: 0,
            hold,
            audio_pos: hold,
            sum_filter: FirFilter::new(taps.clone()),
            diff_filter: FirFilter::new(taps),
            pilot_phase: 0,
            stereo_phase: 0,
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.channels > 1
    }

    pub fn rds_mut(&mut self) -> &mut RdsEncoder {
        &mut self.rds
    }

    fn io_error(&self, msg: impl Into<String>) -> SimError {
        SimError::Io(self.label.clone(), msg.into())
    }

    /// Step to the next source frame, refilling (and looping) as needed.
    fn next_frame(&mut self) -> SimResult<()> {
        if self.audio_left > 0 {
            self.audio_index += self.channels;
            self.audio_left -= self.channels;
            return Ok(());
        }
        let mut got = 0;
        for _ in 0..2 {
            got = self
                .source
                .read_into(&mut self.audio)
                .map_err(|e| self.io_error(e))?;
            if got > 0 {
                break;
            }
            debug!("End of {}, rewinding", self.label.display());
            self.source.rewind().map_err(|e| self.io_error(e))?;
        }
        if got < self.channels {
            warn!("No audio left in {} after rewinding", self.label.display());
            return Err(self.io_error("program source yields no audio"));
        }
        self.audio_index = 0;
        self.audio_left = got - self.channels;
        Ok(())
    }

    /// Fill `out` with the next MPX samples.
    pub fn fill(&mut self, out: &mut [f32]) -> SimResult<()> {
        self.rds.fill(out);
        for y in out.iter_mut() {
            if self.audio_pos >= self.hold {
                self.audio_pos -= self.hold;
                self.next_frame()?;
            }
            let frame = &self.audio[self.audio_index..self.audio_index + self.channels];
            let (sum, diff) = if self.channels > 1 {
                (frame[0] + frame[1], frame[0] - frame[1])
            } else {
                (frame[0], 0.0)
            };

            *y += AUDIO_LEVEL * self.sum_filter.process(sum);
            if self.channels > 1 {
                let diff = self.diff_filter.process(diff);
                *y += AUDIO_LEVEL * CARRIER_38[self.stereo_phase] * diff
                    + PILOT_LEVEL * CARRIER_19[self.pilot_phase];
                self.pilot_phase = (self.pilot_phase + 1) % CARRIER_19.len();
                self.stereo_phase = (self.stereo_phase + 1) % CARRIER_38.len();
            }
            self.audio_pos += 1.0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::write_wav;
    use crate::audio::{SilentSource, WavSource};
    use fmsim_rds::ClockSource;

    fn rds() -> RdsEncoder {
        RdsEncoder::for_station("WSDR", "TEST", "Multiplex test").with_clock(ClockSource::Disabled)
    }

    fn rds_only(n: usize) -> Vec<f32> {
        let mut out = vec![0.0; n];
        rds().fill(&mut out);
        out
    }

    #[test]
    fn carrier_tables_are_sines() {
        for (k, v) in CARRIER_19.iter().enumerate() {
            let expected = (std::f32::consts::TAU * k as f32 / 12.0).sin();
            assert!((v - expected).abs() < 1e-6);
        }
        for (k, v) in CARRIER_38.iter().enumerate() {
            let expected = (std::f32::consts::TAU * 2.0 * k as f32 / 12.0).sin();
            assert!((v - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn audio_filter_has_fixed_length_and_unit_dc() {
        let taps = audio_filter(44_100);
        assert_eq!(taps.len(), AUDIO_FILTER_TAPS);
        let dc: f32 = taps.iter().sum();
        assert!((dc - 1.0).abs() < 0.01, "dc gain {dc}");
    }

    #[test]
    fn silent_mono_is_rds_only() {
        let mut mpx = MpxComposer::new("silence", Box::new(SilentSource::new(1, 48_000)), rds(), 1_000);
        let mut out = vec![0.0; 4_000];
        mpx.fill(&mut out).unwrap();
        assert_eq!(out, rds_only(4_000));
    }

    #[test]
    fn silent_stereo_adds_pilot() {
        let mut mpx = MpxComposer::new("silence", Box::new(SilentSource::default()), rds(), 1_000);
        assert!(mpx.is_stereo());
        let mut out = vec![0.0; 2_400];
        mpx.fill(&mut out[..1_000]).unwrap();
        mpx.fill(&mut out[1_000..]).unwrap();
        let reference = rds_only(2_400);
        for n in 0..out.len() {
            let pilot = out[n] - reference[n];
            let expected = 0.9 * (std::f64::consts::TAU * (n % 12) as f64 / 12.0).sin() as f32;
            assert!((pilot - expected).abs() < 1e-5, "n={n}");
        }
    }

    #[test]
    fn short_wav_loops_and_carries_dc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dc.wav");
        // 10 frames at 22.8 kHz = 100 output samples per pass
        write_wav(&path, 1, 22_800, &[16_384; 10]);
        let src = WavSource::open(&path).unwrap();
        let mut mpx = MpxComposer::new(&path, Box::new(src), rds(), 4);
        let mut out = vec![0.0; 1_000];
        mpx.fill(&mut out).unwrap();
        let reference = rds_only(1_000);
        for n in 200..1_000 {
            let audio = out[n] - reference[n];
            assert!((audio - 4.05 * 0.5).abs() < 0.02, "n={n}: {audio}");
        }
    }

    #[test]
    fn empty_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, 22_800, &[]);
        let src = WavSource::open(&path).unwrap();
        let mut mpx = MpxComposer::new(&path, Box::new(src), rds(), 16);
        let mut out = vec![0.0; 10];
        assert!(matches!(mpx.fill(&mut out), Err(SimError::Io(..))));
    }
}
