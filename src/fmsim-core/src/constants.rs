// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Fixed rates, limits and defaults shared by every simulator crate.

use std::time::Duration;

/// Rate at which each station's multiplex signal is synthesized (Hz).
pub const BASE_SAMPLE_RATE: u32 = 228_000;
/// Polyphase interpolation factor from the base rate to the mixing rate.
pub const UPSAMPLE_FACTOR: usize = 10;
/// Mixing rate; every output rate divides it.
pub const MAX_OUTPUT_SAMPLE_RATE: u32 = BASE_SAMPLE_RATE * UPSAMPLE_FACTOR as u32;
pub const MIN_OUTPUT_SAMPLE_RATE: u32 = MAX_OUTPUT_SAMPLE_RATE / 1000;

/// Peak FM deviation (Hz).
pub const MAX_FREQUENCY_DEVIATION_HZ: f32 = 75_000.0;
/// Stopband attenuation for every designed FIR (dB).
pub const FILTER_ATTENUATION_DB: f32 = 70.0;

/// Samples pulled per station per cycle, at the base rate.
pub const DEFAULT_BLOCK_SIZE: usize = 100_000;

pub const CALL_SIGN_LEN: usize = 4;
pub const SHORT_TEXT_LEN: usize = 8;
pub const LONG_TEXT_LEN: usize = 64;

pub const DEFAULT_CALL_SIGN: &str = "WSDR";
pub const DEFAULT_SHORT_TEXT: &str = "FMSIM";
pub const DEFAULT_LONG_TEXT: &str = "Simulated FM broadcast with RDS";

pub const DEFAULT_CENTER_FREQUENCY_HZ: f64 = 88_500_000.0;
pub const DEFAULT_QUEUE_SIZE: usize = 5;
pub const DEFAULT_NOISE_SIGMA: f32 = 0.1;
pub const DEFAULT_GAIN_DB: f32 = 0.0;
pub const DEFAULT_MIN_GAIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_GAIN_DB: f32 = 100.0;

/// Wall-clock duration covered by one block of `block_size` base-rate samples.
pub fn cycle_period(block_size: usize) -> Duration {
    let micros = block_size as u64 * 1_000_000 / u64::from(BASE_SAMPLE_RATE);
    Duration::from_micros(micros.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_follow_base_rate() {
        assert_eq!(MAX_OUTPUT_SAMPLE_RATE, 2_280_000);
        assert_eq!(MIN_OUTPUT_SAMPLE_RATE, 2_280);
    }

    #[test]
    fn default_block_period_is_about_439_ms() {
        let period = cycle_period(DEFAULT_BLOCK_SIZE);
        assert_eq!(period.as_millis(), 438);
        assert_eq!(cycle_period(BASE_SAMPLE_RATE as usize), Duration::from_secs(1));
    }
}
