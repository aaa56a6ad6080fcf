// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Phase-accumulating FM modulator with a fixed-point sine lookup.

use std::f64::consts::PI;
use std::sync::OnceLock;

use num_complex::Complex;

const TABLE_BITS: u32 = 10;
const TABLE_SIZE: usize = 1 << TABLE_BITS;
const FRAC_BITS: u32 = 32 - TABLE_BITS;
const FRAC_MASK: u32 = (1 << FRAC_BITS) - 1;
const FRAC_SCALE: f32 = 1.0 / (1u32 << FRAC_BITS) as f32;

/// One linear segment per table entry: value at the segment start and the
/// rise across the segment.
fn sine_table() -> &'static [(f32, f32)] {
    static TABLE: OnceLock<Vec<(f32, f32)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..TABLE_SIZE)
            .map(|i| {
                let x0 = 2.0 * PI * i as f64 / TABLE_SIZE as f64;
                let x1 = 2.0 * PI * (i + 1) as f64 / TABLE_SIZE as f64;
                let y0 = x0.sin();
                (y0 as f32, (x1.sin() - y0) as f32)
            })
            .collect()
    })
}

/// Map an angle in radians onto the full `i32` range (π ↔ 2³¹).
pub fn float_to_fixed(x: f32) -> i32 {
    let x = f64::from(x);
    let turns = (x / (2.0 * PI) + 0.5).floor();
    let folded = x - turns * 2.0 * PI;
    (folded * (1u64 << 31) as f64 / PI) as i32
}

fn fixed_sin(angle: i32) -> f32 {
    let ux = angle as u32;
    let (base, rise) = sine_table()[(ux >> FRAC_BITS) as usize];
    base + rise * (ux & FRAC_MASK) as f32 * FRAC_SCALE
}

fn fixed_cos(angle: i32) -> f32 {
    fixed_sin(angle.wrapping_add(1 << 30))
}

/// Real input to unit-magnitude complex output. The phase advances by
/// `sensitivity * x` per sample and carries across calls.
#[derive(Debug, Clone)]
pub struct FrequencyModulator {
    sensitivity: f32,
    phase: f32,
}

impl FrequencyModulator {
    pub fn new(sensitivity: f32) -> Self {
        // Build the table here, not on the first sample of the first block.
        sine_table();
        Self {
            sensitivity,
            phase: 0.0,
        }
    }

    /// Sensitivity for a given peak deviation (Hz) at `sample_rate` (Hz).
    pub fn sensitivity_for(max_deviation_hz: f32, sample_rate_hz: f32) -> f32 {
        (2.0 * PI as f32 * max_deviation_hz) / sample_rate_hz
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn modulate_into(&mut self, input: &[f32], output: &mut [Complex<f32>]) {
        const PI32: f32 = std::f32::consts::PI;
        const TAU32: f32 = std::f32::consts::TAU;
        for (x, y) in input.iter().zip(output.iter_mut()) {
            let phase = self.phase + self.sensitivity * x;
            // Non-finite steps leave the phase where it was.
            if phase.is_finite() {
                self.phase = if phase > PI32 || phase <= -PI32 {
                    let folded = (phase + PI32).rem_euclid(TAU32) - PI32;
                    if folded <= -PI32 {
                        folded + TAU32
                    } else {
                        folded
                    }
                } else {
                    phase
                };
            }
            let angle = float_to_fixed(self.phase);
            *y = Complex::new(fixed_cos(angle), fixed_sin(angle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_trig_tracks_libm() {
        for k in -200..=200 {
            let x = k as f32 * 0.0157;
            let a = float_to_fixed(x);
            assert!((fixed_sin(a) - x.sin()).abs() < 1e-5, "sin({x})");
            assert!((fixed_cos(a) - x.cos()).abs() < 1e-5, "cos({x})");
        }
    }

    #[test]
    fn output_is_unit_magnitude() {
        let mut fm = FrequencyModulator::new(FrequencyModulator::sensitivity_for(75_000.0, 228_000.0));
        let input: Vec<f32> = (0..5_000).map(|n| (n as f32 * 0.01).sin()).collect();
        let mut out = vec![Complex::default(); input.len()];
        fm.modulate_into(&input, &mut out);
        for y in &out {
            assert!((y.norm() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn phase_steps_follow_input() {
        let sens = 0.5;
        let mut fm = FrequencyModulator::new(sens);
        let input: Vec<f32> = (0..400).map(|n| ((n % 13) as f32 - 6.0) / 6.0).collect();
        let mut out = vec![Complex::default(); input.len()];
        fm.modulate_into(&input, &mut out);
        for n in 1..out.len() {
            let step = (out[n] * out[n - 1].conj()).arg();
            assert!((step - sens * input[n]).abs() < 1e-3, "n={n}");
        }
    }

    #[test]
    fn phase_stays_wrapped_across_calls() {
        let mut fm = FrequencyModulator::new(1.0);
        let mut out = [Complex::default(); 100];
        fm.modulate_into(&[3.0; 100], &mut out);
        fm.modulate_into(&[3.0; 100], &mut out);
        assert!(fm.phase() > -std::f32::consts::PI && fm.phase() <= std::f32::consts::PI);
    }

    #[test]
    fn huge_and_non_finite_inputs_return() {
        let mut fm = FrequencyModulator::new(1.0);
        let mut out = [Complex::default(); 4];
        fm.modulate_into(&[1.0e9, -3.0e12, f32::INFINITY, f32::NAN], &mut out);
        let phase = fm.phase();
        assert!(phase > -std::f32::consts::PI && phase <= std::f32::consts::PI, "{phase}");
        for y in &out {
            assert!((y.norm() - 1.0).abs() < 1e-4);
        }

        // An infinite sample holds the phase.
        let before = fm.phase();
        fm.modulate_into(&[f32::NEG_INFINITY], &mut out[..1]);
        assert_eq!(fm.phase(), before);
    }
}
