// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f64::consts::TAU;

use num_complex::Complex;

/// Complex frequency shifter.
///
/// Absolute phase is kept in cycles as `f64` and wrapped after every
/// block, and each block's phasor sequence is seeded from it. Rounding in
/// the per-sample recurrence therefore never outlives one block.
#[derive(Debug, Clone, Default)]
pub struct Tuner {
    /// Phase at the start of the next block, in cycles, within [0, 1).
    cycles: f64,
    /// Phase increment per sample, in cycles.
    step: f64,
}

impl Tuner {
    pub fn new(norm_fc: f64) -> Self {
        Self {
            cycles: 0.0,
            step: norm_fc,
        }
    }

    /// Change the per-sample increment to `exp(-j2π·norm_fc)`. The
    /// accumulated phase is kept.
    pub fn retune(&mut self, norm_fc: f64) {
        self.step = norm_fc;
    }

    pub fn norm_fc(&self) -> f64 {
        self.step
    }

    pub fn phase_cycles(&self) -> f64 {
        self.cycles
    }

    pub fn run(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        let mut phasor = Complex::from_polar(1.0, -TAU * self.cycles);
        let rotation = Complex::from_polar(1.0, -TAU * self.step);
        let n = input.len().min(output.len());
        for (x, y) in input[..n].iter().zip(output[..n].iter_mut()) {
            let shifted = Complex::new(f64::from(x.re), f64::from(x.im)) * phasor;
            *y = Complex::new(shifted.re as f32, shifted.im as f32);
            phasor *= rotation;
        }
        self.cycles = (self.cycles + n as f64 * self.step).rem_euclid(1.0);
    }

    pub fn run_in_place(&mut self, buf: &mut [Complex<f32>]) {
        let mut phasor = Complex::from_polar(1.0, -TAU * self.cycles);
        let rotation = Complex::from_polar(1.0, -TAU * self.step);
        for y in buf.iter_mut() {
            let shifted = Complex::new(f64::from(y.re), f64::from(y.im)) * phasor;
            *y = Complex::new(shifted.re as f32, shifted.im as f32);
            phasor *= rotation;
        }
        self.cycles = (self.cycles + buf.len() as f64 * self.step).rem_euclid(1.0);
    }
}
