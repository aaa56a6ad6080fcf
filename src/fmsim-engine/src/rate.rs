// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Output sample-rate selection and the anti-alias/decimation stage.

use fmsim_core::constants::{FILTER_ATTENUATION_DB, MAX_OUTPUT_SAMPLE_RATE, MIN_OUTPUT_SAMPLE_RATE};
use fmsim_core::Sample;
use fmsim_dsp::filter_design::{design, DesignParams, FilterType};
use fmsim_dsp::FirFilter;
use tracing::debug;

/// Longest anti-alias filter; narrow cutoffs would otherwise need
/// thousands of taps.
const MAX_RATE_FILTER_TAPS: usize = 255;

/// Output rates reachable by integer decimation of the mixing rate,
/// ascending.
pub fn available_sample_rates() -> Vec<u32> {
    let max = MAX_OUTPUT_SAMPLE_RATE;
    let mut rates: Vec<u32> = (1..=max / MIN_OUTPUT_SAMPLE_RATE)
        .filter(|n| max % n == 0)
        .map(|n| max / n)
        .filter(|&r| r >= MIN_OUTPUT_SAMPLE_RATE)
        .collect();
    rates.sort_unstable();
    rates
}

/// Closest entry of `rates` to `requested`; ties go to the higher rate.
pub fn nearest_rate(rates: &[u32], requested: u32) -> Option<u32> {
    rates
        .iter()
        .copied()
        .min_by_key(|&r| (r.abs_diff(requested), std::cmp::Reverse(r)))
}

/// Lowpass + puncture from the mixing rate down to `rate`.
#[derive(Debug, Clone)]
pub struct RateConverter {
    rate: u32,
    decimation: usize,
    filter: FirFilter<Sample>,
}

impl RateConverter {
    /// `rate` must divide the mixing rate.
    pub fn new(rate: u32) -> Self {
        let decimation = (MAX_OUTPUT_SAMPLE_RATE / rate.max(1)) as usize;
        let taps = if decimation <= 1 {
            vec![1.0]
        } else {
            // Cutoff at the new Nyquist, normalized to the mixing rate.
            let cutoff = 0.5 * f64::from(rate) / f64::from(MAX_OUTPUT_SAMPLE_RATE);
            design(
                FilterType::Lowpass,
                DesignParams::lowpass(FILTER_ATTENUATION_DB.into(), cutoff / 5.0, cutoff)
                    .with_tap_limits(1, MAX_RATE_FILTER_TAPS),
            )
        };
        debug!(
            "Rate converter for {} Hz: decimate by {}, {} taps",
            rate,
            decimation,
            taps.len()
        );
        Self {
            rate,
            decimation,
            filter: FirFilter::new(taps),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn taps(&self) -> usize {
        self.filter.taps()
    }

    /// Samples kept from an input of `input_len`: indices 0, N, 2N, ...
    pub fn output_len(&self, input_len: usize) -> usize {
        input_len.div_ceil(self.decimation)
    }

    /// Filter `input` as a whole block and keep every `decimation`-th sample.
    pub fn process(&self, input: &[Sample]) -> Vec<Sample> {
        let mut out = vec![Sample::default(); self.output_len(input.len())];
        self.filter
            .filter_block_decimated_into(input, self.decimation, &mut out);
        out
    }
}
