// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Kaiser-window FIR design.
//!
//! All frequencies are normalized to the sample rate, so 0.5 is Nyquist.

use std::f64::consts::PI;

use num_complex::Complex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
    /// Declared for completeness; the designer produces no taps for it.
    Hilbert,
}

/// Requirements handed to [`design`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignParams {
    /// Stopband attenuation (dB).
    pub atten_db: f64,
    /// Transition width, normalized.
    pub transition_width: f64,
    /// Cutoff for lowpass/highpass, lower edge for bandpass/bandstop.
    pub low_cutoff: f64,
    /// Upper edge for bandpass/bandstop; ignored otherwise.
    pub high_cutoff: f64,
    pub min_taps: usize,
    /// Upper bound on the tap count; 0 means unbounded.
    pub max_taps: usize,
}

impl DesignParams {
    pub fn lowpass(atten_db: f64, transition_width: f64, cutoff: f64) -> Self {
        Self {
            atten_db,
            transition_width,
            low_cutoff: cutoff,
            high_cutoff: 0.0,
            min_taps: 1,
            max_taps: 0,
        }
    }

    pub fn band(atten_db: f64, transition_width: f64, low: f64, high: f64) -> Self {
        Self {
            low_cutoff: low,
            high_cutoff: high,
            ..Self::lowpass(atten_db, transition_width, low)
        }
    }

    pub fn with_tap_limits(mut self, min_taps: usize, max_taps: usize) -> Self {
        self.min_taps = min_taps;
        self.max_taps = max_taps;
        self
    }

    /// Build parameters from frequencies in Hz.
    pub fn from_hz(
        atten_db: f64,
        transition_hz: f64,
        low_hz: f64,
        high_hz: f64,
        sample_rate_hz: f64,
    ) -> Self {
        Self::band(
            atten_db,
            transition_hz / sample_rate_hz,
            low_hz / sample_rate_hz,
            high_hz / sample_rate_hz,
        )
    }
}

// ---------------------------------------------------------------------------
// Kaiser window
// ---------------------------------------------------------------------------

/// Filter length from the Kaiser estimate (order + 1).
pub fn kaiser_length(atten_db: f64, transition_width: f64) -> usize {
    let tw_rad = 2.0 * PI * transition_width;
    let order = if atten_db >= 20.96 {
        ((atten_db - 7.95) / (2.285 * tw_rad)).ceil()
    } else {
        (5.79 / tw_rad).ceil()
    };
    order.max(0.0) as usize + 1
}

pub fn kaiser_beta(atten_db: f64) -> f64 {
    if atten_db > 50.0 {
        0.1102 * (atten_db - 8.7)
    } else if atten_db >= 20.96 {
        let a = atten_db - 20.96;
        0.58417 * a.powf(0.4) + 0.07886 * a
    } else {
        0.0
    }
}

/// Zeroth-order modified Bessel function of the first kind, by power series.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..=25 {
        let f = half / k as f64;
        term *= f * f;
        sum += term;
        if term < 1e-7 * sum {
            break;
        }
    }
    sum
}

pub fn kaiser_window(len: usize, beta: f64) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let denom = bessel_i0(beta);
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let r = 2.0 * n as f64 / span - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Real and complex designs
// ---------------------------------------------------------------------------

fn sanitize(mut p: DesignParams) -> DesignParams {
    if p.transition_width < 0.0 {
        warn!("Negative transition width {}, using its magnitude", p.transition_width);
        p.transition_width = -p.transition_width;
    }
    if p.low_cutoff < 0.0 {
        warn!("Negative low cutoff {}, using its magnitude", p.low_cutoff);
        p.low_cutoff = -p.low_cutoff;
    }
    if p.high_cutoff < 0.0 {
        warn!("Negative high cutoff {}, using its magnitude", p.high_cutoff);
        p.high_cutoff = -p.high_cutoff;
    }
    p
}

fn tap_count(kind: FilterType, p: &DesignParams) -> usize {
    let mut taps = kaiser_length(p.atten_db, p.transition_width);
    if p.max_taps != 0 && taps > p.max_taps {
        debug!("Kaiser length {} above limit, using {}", taps, p.max_taps);
        taps = p.max_taps;
    } else if taps < p.min_taps {
        debug!("Kaiser length {} below limit, using {}", taps, p.min_taps);
        taps = p.min_taps;
    }
    let needs_odd = matches!(kind, FilterType::Highpass | FilterType::Bandstop);
    if needs_odd && taps % 2 == 0 {
        if p.max_taps == 0 || taps < p.max_taps {
            taps += 1;
        } else {
            taps -= 1;
        }
    }
    taps
}

/// Design real coefficients for `kind`.
///
/// Highpass and bandstop filters always get an odd length. Hilbert
/// transformers are not supported and yield an empty vector.
pub fn design(kind: FilterType, params: DesignParams) -> Vec<f32> {
    if kind == FilterType::Hilbert {
        warn!("Hilbert filters are not supported, returning no coefficients");
        return Vec::new();
    }
    let mut p = sanitize(params);
    let len = tap_count(kind, &p);
    let odd = len % 2 == 1;

    let banded = matches!(kind, FilterType::Bandpass | FilterType::Bandstop);
    let mut c1 = p.low_cutoff;
    if banded {
        if p.high_cutoff < p.low_cutoff {
            warn!("Band edges given in reverse order, swapping");
            std::mem::swap(&mut p.low_cutoff, &mut p.high_cutoff);
        }
        c1 = p.high_cutoff - p.low_cutoff;
    }

    let half = (len + 1) / 2;
    let mut taps = vec![0.0f64; len];
    if odd {
        taps[half - 1] = 2.0 * c1;
    }
    let first = usize::from(odd);
    for ii in first..half {
        let xn = if odd { ii as f64 } else { ii as f64 + 0.5 };
        let c = PI * xn;
        let mut c3 = c * c1;
        if !banded {
            c3 *= 2.0;
        }
        let mut value = c3.sin() / c;
        if banded {
            value *= 2.0 * (c * (p.low_cutoff + p.high_cutoff)).cos();
        }
        let jj = half + ii - first;
        taps[jj] = value;
        taps[half - ii - 1] = value;
    }

    let window = kaiser_window(len, kaiser_beta(p.atten_db));
    for (t, w) in taps.iter_mut().zip(window.iter()) {
        *t *= w;
    }

    // Spectral inversion turns the lowpass/bandpass prototype into its complement.
    if matches!(kind, FilterType::Highpass | FilterType::Bandstop) {
        for t in taps.iter_mut() {
            *t = -*t;
        }
        taps[half - 1] += 1.0;
    }

    taps.into_iter().map(|t| t as f32).collect()
}

/// Design complex coefficients. Lowpass and highpass are the real design
/// with zero imaginary part; bandpass and bandstop are a lowpass/highpass of
/// half the bandwidth shifted to the band center.
pub fn design_complex(kind: FilterType, params: DesignParams) -> Vec<Complex<f32>> {
    match kind {
        FilterType::Lowpass | FilterType::Highpass | FilterType::Hilbert => design(kind, params)
            .into_iter()
            .map(|t| Complex::new(t, 0.0))
            .collect(),
        FilterType::Bandpass | FilterType::Bandstop => {
            let p = sanitize(params);
            let prototype_kind = if kind == FilterType::Bandstop {
                FilterType::Highpass
            } else {
                FilterType::Lowpass
            };
            let half_bw = (p.high_cutoff - p.low_cutoff).abs() / 2.0;
            let prototype = design(prototype_kind, DesignParams { low_cutoff: half_bw, ..p });

            let step = PI * (p.high_cutoff + p.low_cutoff);
            let phasor = Complex::new(step.cos(), step.sin());
            let mut rot = phasor;
            prototype
                .into_iter()
                .map(|t| {
                    let out = Complex::new((f64::from(t) * rot.re) as f32, (f64::from(t) * rot.im) as f32);
                    rot *= phasor;
                    out
                })
                .collect()
        }
    }
}

/// Magnitude response of real taps at normalized frequency `f`.
pub fn magnitude_response(taps: &[f32], f: f64) -> f64 {
    let w = 2.0 * PI * f;
    let acc = taps.iter().enumerate().fold(Complex::new(0.0f64, 0.0), |acc, (n, &t)| {
        acc + Complex::from_polar(f64::from(t), -w * n as f64)
    });
    acc.norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DesignParams {
        DesignParams::band(60.0, 0.05, 0.1, 0.3)
    }

    #[test]
    fn kaiser_length_matches_estimate() {
        // (60 - 7.95) / (2.285 * 2π * 0.05) = 72.5 -> order 73, 74 taps
        assert_eq!(kaiser_length(60.0, 0.05), 74);
        // below 20.96 dB: 5.79 / (2π * 0.1) = 9.2 -> order 10
        assert_eq!(kaiser_length(15.0, 0.1), 11);
    }

    #[test]
    fn beta_regions() {
        assert_eq!(kaiser_beta(20.0), 0.0);
        assert!((kaiser_beta(70.0) - 0.1102 * 61.3).abs() < 1e-12);
        let mid = kaiser_beta(40.0);
        let a: f64 = 40.0 - 20.96;
        assert!((mid - (0.58417 * a.powf(0.4) + 0.07886 * a)).abs() < 1e-12);
    }

    #[test]
    fn highpass_and_bandstop_lengths_are_odd() {
        for kind in [FilterType::Highpass, FilterType::Bandstop] {
            for tw in [0.01, 0.033, 0.05, 0.07, 0.2] {
                let taps = design(kind, DesignParams { transition_width: tw, ..params() });
                assert_eq!(taps.len() % 2, 1, "{kind:?} tw={tw}");
                let estimate = kaiser_length(60.0, tw);
                assert!(taps.len() == estimate || taps.len() == estimate + 1);
            }
        }
    }

    #[test]
    fn lowpass_and_bandpass_keep_estimate() {
        for kind in [FilterType::Lowpass, FilterType::Bandpass] {
            let taps = design(kind, params());
            assert_eq!(taps.len(), kaiser_length(60.0, 0.05));
        }
    }

    #[test]
    fn even_length_at_cap_drops_a_tap() {
        let p = params().with_tap_limits(1, 20);
        assert_eq!(design(FilterType::Lowpass, p).len(), 20);
        assert_eq!(design(FilterType::Highpass, p).len(), 19);
    }

    #[test]
    fn lowpass_has_unit_dc_gain_and_rejects_stopband() {
        let taps = design(FilterType::Lowpass, DesignParams::lowpass(70.0, 0.02, 0.1));
        assert!((magnitude_response(&taps, 0.0) - 1.0).abs() < 1e-3);
        assert!(magnitude_response(&taps, 0.2) < 1e-3);
        let mid = taps.len() / 2;
        for k in 0..mid {
            assert!((taps[k] - taps[taps.len() - 1 - k]).abs() < 1e-7);
        }
    }

    #[test]
    fn highpass_passes_nyquist_and_blocks_dc() {
        let taps = design(FilterType::Highpass, DesignParams::lowpass(60.0, 0.05, 0.2));
        assert!(magnitude_response(&taps, 0.0) < 2e-3);
        assert!((magnitude_response(&taps, 0.5) - 1.0).abs() < 2e-3);
    }

    #[test]
    fn bandpass_centers_on_band() {
        let taps = design(FilterType::Bandpass, params());
        assert!((magnitude_response(&taps, 0.2) - 1.0).abs() < 2e-3);
        assert!(magnitude_response(&taps, 0.0) < 2e-3);
        assert!(magnitude_response(&taps, 0.45) < 2e-3);
    }

    #[test]
    fn reversed_band_edges_are_swapped() {
        let forward = design(FilterType::Bandpass, params());
        let reversed = design(FilterType::Bandpass, DesignParams::band(60.0, 0.05, 0.3, 0.1));
        assert_eq!(forward, reversed);
    }

    #[test]
    fn hilbert_is_unsupported() {
        assert!(design(FilterType::Hilbert, params()).is_empty());
        assert!(design_complex(FilterType::Hilbert, params()).is_empty());
    }

    #[test]
    fn complex_bandpass_is_one_sided() {
        let taps = design_complex(FilterType::Bandpass, DesignParams::band(60.0, 0.05, 0.1, 0.3));
        let response = |f: f64| {
            let w = 2.0 * PI * f;
            taps.iter()
                .enumerate()
                .fold(Complex::new(0.0f64, 0.0), |acc, (n, t)| {
                    acc + Complex::new(f64::from(t.re), f64::from(t.im))
                        * Complex::from_polar(1.0, -w * n as f64)
                })
                .norm()
        };
        assert!((response(0.2) - 1.0).abs() < 2e-3);
        assert!(response(-0.2) < 2e-3);
    }

    #[test]
    fn hz_parameters_normalize() {
        let p = DesignParams::from_hz(70.0, 2_280.0, 12_000.0, 0.0, 228_000.0);
        assert!((p.transition_width - 0.01).abs() < 1e-12);
        assert!((p.low_cutoff - 12_000.0 / 228_000.0).abs() < 1e-12);
    }
}
