// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::ops::{Add, AddAssign, Mul};

use num_complex::Complex;

use crate::ring::RingBuffer;

/// FIR filter with real coefficients over real or complex samples.
///
/// Two ways to run it:
/// - block mode ([`filter_block_into`](Self::filter_block_into)) treats the
///   input as the whole signal, centers the response on the middle tap and
///   drops terms that fall outside the buffer. History is not touched.
/// - streaming mode ([`process`](Self::process)) is a causal convolution
///   that keeps the last `taps - 1` inputs between calls.
#[derive(Debug, Clone)]
pub struct FirFilter<T = Complex<f32>> {
    coeffs: Vec<f32>,
    history: RingBuffer<T>,
}

impl<T> FirFilter<T>
where
    T: Copy + Default + Add<Output = T> + AddAssign + Mul<f32, Output = T>,
{
    pub fn new(coeffs: Vec<f32>) -> Self {
        let history = RingBuffer::new(coeffs.len().saturating_sub(1));
        Self { coeffs, history }
    }

    pub fn coeffs(&self) -> &[f32] {
        &self.coeffs
    }

    pub fn taps(&self) -> usize {
        self.coeffs.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    // -----------------------------------------------------------------------
    // Block mode
    // -----------------------------------------------------------------------

    fn block_output(&self, input: &[T], i: usize) -> T {
        let len = self.coeffs.len();
        let center = (len + 1) / 2 - 1;
        // y[i] = sum_j h[j] * x[i + center - j], in-range terms only
        let top = i + center;
        let j_start = top.saturating_sub(input.len() - 1);
        let j_end = len.min(top + 1);
        let mut acc = T::default();
        for j in j_start..j_end {
            acc += input[top - j] * self.coeffs[j];
        }
        acc
    }

    /// Zero-phase filtering of a complete buffer. `output` must be at least
    /// as long as `input`.
    pub fn filter_block_into(&self, input: &[T], output: &mut [T]) {
        if self.coeffs.is_empty() || input.is_empty() {
            output.iter_mut().for_each(|y| *y = T::default());
            return;
        }
        for (i, y) in output.iter_mut().take(input.len()).enumerate() {
            *y = self.block_output(input, i);
        }
    }

    /// Block-mode filtering evaluated only at every `step`-th index starting
    /// at 0. Produces exactly the samples `filter_block_into` followed by
    /// decimation would keep.
    pub fn filter_block_decimated_into(&self, input: &[T], step: usize, output: &mut [T]) {
        let step = step.max(1);
        if self.coeffs.is_empty() || input.is_empty() {
            output.iter_mut().for_each(|y| *y = T::default());
            return;
        }
        for (m, y) in output.iter_mut().enumerate() {
            let i = m * step;
            if i >= input.len() {
                break;
            }
            *y = self.block_output(input, i);
        }
    }

    // -----------------------------------------------------------------------
    // Streaming mode
    // -----------------------------------------------------------------------

    /// Filter one sample against the saved history.
    pub fn process(&mut self, sample: T) -> T {
        let Some((&h0, rest)) = self.coeffs.split_first() else {
            return T::default();
        };
        let mut acc = sample * h0;
        for (h, past) in rest.iter().zip(self.history.iter_newest()) {
            acc += past * *h;
        }
        self.history.push(sample);
        acc
    }

    pub fn process_block_into(&mut self, input: &[T], output: &mut [T]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.process(*x);
        }
    }
}
