// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One simulated station: MPX → FM → ×10 polyphase interpolation → tuning.

use std::sync::{Arc, Mutex, MutexGuard};

use fmsim_core::constants::{
    BASE_SAMPLE_RATE, FILTER_ATTENUATION_DB, MAX_FREQUENCY_DEVIATION_HZ, MAX_OUTPUT_SAMPLE_RATE,
    UPSAMPLE_FACTOR,
};
use fmsim_core::{Sample, SimError, SimResult, StationConfig};
use fmsim_dsp::filter_design::{design, DesignParams, FilterType};
use fmsim_dsp::{FirFilter, FrequencyModulator, Tuner};
use fmsim_rds::{ClockSource, RdsEncoder};
use tracing::{debug, error, info};

use crate::audio::{ProgramSource, WavSource};
use crate::mpx::MpxComposer;

/// Taps in the interpolation prototype; each branch gets a tenth.
const INTERP_TAPS: usize = 30;
/// Prototype cutoff, normalized to the mixing rate.
const INTERP_CUTOFF: f64 = 0.5 * 0.5 * (BASE_SAMPLE_RATE as f64 / MAX_OUTPUT_SAMPLE_RATE as f64);
/// MPX peak is about 10; bring it to ±1 before modulation.
const MPX_SCALE: f32 = 0.1;

/// Split the interpolation prototype into `UPSAMPLE_FACTOR` branches.
/// Branch `i` holds taps `i, i + 10, i + 20`; the prototype is scaled so
/// each branch has roughly unit DC gain.
fn polyphase_branches() -> Vec<Vec<f32>> {
    let mut proto = design(
        FilterType::Lowpass,
        DesignParams::lowpass(FILTER_ATTENUATION_DB.into(), INTERP_CUTOFF, INTERP_CUTOFF)
            .with_tap_limits(INTERP_TAPS, INTERP_TAPS),
    );
    let sum: f32 = proto.iter().sum();
    if sum.abs() > f32::EPSILON {
        let scale = UPSAMPLE_FACTOR as f32 / sum;
        proto.iter_mut().for_each(|t| *t *= scale);
    }
    (0..UPSAMPLE_FACTOR)
        .map(|i| proto.iter().skip(i).step_by(UPSAMPLE_FACTOR).copied().collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TuningState {
    center_hz: f64,
    tuned_hz: f64,
    tuner: Tuner,
}

impl TuningState {
    fn norm_fc(&self) -> f64 {
        (self.tuned_hz - self.center_hz) / f64::from(MAX_OUTPUT_SAMPLE_RATE)
    }

    fn in_band(&self) -> bool {
        (self.center_hz - self.tuned_hz).abs() <= 0.5 * f64::from(MAX_OUTPUT_SAMPLE_RATE)
    }
}

/// Shared handle to a transmitter's tuning, usable while it is running.
#[derive(Debug, Clone)]
pub struct TuningHandle(Arc<Mutex<TuningState>>);

impl TuningHandle {
    fn lock(&self) -> MutexGuard<'_, TuningState> {
        // Tuning state stays valid even if a holder panicked.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receiver frequency changed: only the tuner increment moves, its
    /// phase carries on.
    pub fn set_tuned_frequency(&self, tuned_hz: f64) {
        let mut state = self.lock();
        state.tuned_hz = tuned_hz;
        let norm_fc = state.norm_fc();
        state.tuner.retune(norm_fc);
    }

    pub fn tuned_frequency(&self) -> f64 {
        self.lock().tuned_hz
    }

    pub fn norm_fc(&self) -> f64 {
        self.lock().norm_fc()
    }

    pub fn in_band(&self) -> bool {
        self.lock().in_band()
    }
}

// ---------------------------------------------------------------------------
// Transmitter
// ---------------------------------------------------------------------------

pub struct Transmitter {
    config: StationConfig,
    block_size: usize,
    mpx: MpxComposer,
    modulator: FrequencyModulator,
    branches: Vec<FirFilter<Sample>>,
    mpx_buf: Vec<f32>,
    fm_buf: Vec<Sample>,
    up_buf: Vec<Sample>,
    out_buf: Vec<Sample>,
    tuning: TuningHandle,
}

impl Transmitter {
    /// Open the station's WAV file and build the pipeline.
    pub fn open(config: StationConfig, block_size: usize, clock: ClockSource) -> SimResult<Self> {
        if config.source.as_os_str().is_empty() {
            return Err(SimError::Io(
                config.source.clone(),
                format!("no program source set for {}", config.call_sign()),
            ));
        }
        let source = WavSource::open(&config.source)?;
        Ok(Self::with_source(config, Box::new(source), block_size, clock))
    }

    /// Build the pipeline around an already opened program source.
    pub fn with_source(
        config: StationConfig,
        source: Box<dyn ProgramSource>,
        block_size: usize,
        clock: ClockSource,
    ) -> Self {
        let rds = RdsEncoder::for_station(config.call_sign(), config.short_text(), config.long_text())
            .with_clock(clock);
        let mpx = MpxComposer::new(config.source.clone(), source, rds, block_size);
        let branches = polyphase_branches().into_iter().map(FirFilter::new).collect();
        let sensitivity =
            FrequencyModulator::sensitivity_for(MAX_FREQUENCY_DEVIATION_HZ, BASE_SAMPLE_RATE as f32);
        let tuning = TuningHandle(Arc::new(Mutex::new(TuningState {
            center_hz: config.center_frequency_hz,
            tuned_hz: config.center_frequency_hz,
            tuner: Tuner::new(0.0),
        })));

        info!(
            "Station {} at {:.3} MHz ({}, {})",
            config.call_sign(),
            config.center_frequency_hz / 1e6,
            config.source.display(),
            if mpx.is_stereo() { "stereo" } else { "mono" }
        );

        Self {
            config,
            block_size,
            mpx,
            modulator: FrequencyModulator::new(sensitivity),
            branches,
            mpx_buf: vec![0.0; block_size],
            fm_buf: vec![Sample::default(); block_size],
            up_buf: vec![Sample::default(); block_size * UPSAMPLE_FACTOR],
            out_buf: vec![Sample::default(); block_size * UPSAMPLE_FACTOR],
            tuning,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn tuning_handle(&self) -> TuningHandle {
        self.tuning.clone()
    }

    pub fn set_tuned_frequency(&self, tuned_hz: f64) {
        self.tuning.set_tuned_frequency(tuned_hz);
    }

    /// Most recent output block, `block_size * 10` samples at the mixing
    /// rate. Valid until the next [`run`](Self::run).
    pub fn data(&self) -> &[Sample] {
        &self.out_buf
    }

    /// Produce one block. Out-of-band stations and failed runs yield silence.
    pub fn run(&mut self) {
        if !self.tuning.in_band() {
            self.out_buf.fill(Sample::default());
            return;
        }
        if let Err(e) = self.generate() {
            error!("Station {} failed, sending silence: {}", self.config.call_sign(), e);
            self.out_buf.fill(Sample::default());
        }
    }

    fn generate(&mut self) -> SimResult<()> {
        self.mpx.fill(&mut self.mpx_buf)?;
        self.mpx_buf.iter_mut().for_each(|s| *s *= MPX_SCALE);
        self.modulator.modulate_into(&self.mpx_buf, &mut self.fm_buf);

        // up[10 n + i] = branch_i(fm[n])
        for (x, phases) in self
            .fm_buf
            .iter()
            .zip(self.up_buf.chunks_exact_mut(UPSAMPLE_FACTOR))
        {
            for (branch, y) in self.branches.iter_mut().zip(phases.iter_mut()) {
                *y = branch.process(*x);
            }
        }

        let mut tuning = self.tuning.lock();
        tuning.tuner.run(&self.up_buf, &mut self.out_buf);
        debug!(
            "Station {} block done, tuner phase {:.6}",
            self.config.call_sign(),
            tuning.tuner.phase_cycles()
        );
        Ok(())
    }
}
