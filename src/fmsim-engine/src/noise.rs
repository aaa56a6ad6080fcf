// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use fmsim_core::{Sample, SimError, SimResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Precomputed complex white Gaussian noise, read cyclically.
///
/// Regenerating per cycle is too costly at the mixing rate, so one table is
/// built per sigma and a cursor walks through it block after block.
#[derive(Debug, Clone)]
pub struct NoiseTable {
    samples: Vec<Sample>,
    sigma: f32,
    cursor: usize,
}

impl NoiseTable {
    /// `sigma` is the standard deviation of each of I and Q. A fixed `seed`
    /// makes the table reproducible.
    pub fn generate(len: usize, sigma: f32, seed: Option<u64>) -> SimResult<Self> {
        let dist = Normal::new(0.0f32, sigma).map_err(|_| SimError::InvalidValue {
            name: "noise sigma",
            value: f64::from(sigma),
        })?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let samples = (0..len)
            .map(|_| Sample::new(dist.sample(&mut rng), dist.sample(&mut rng)))
            .collect();
        Ok(Self {
            samples,
            sigma,
            cursor: 0,
        })
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add the next `buf.len()` noise samples, wrapping around the table.
    pub fn add_to(&mut self, buf: &mut [Sample]) {
        if self.samples.is_empty() {
            return;
        }
        let mut done = 0;
        while done < buf.len() {
            let avail = &self.samples[self.cursor..];
            let n = avail.len().min(buf.len() - done);
            for (y, w) in buf[done..done + n].iter_mut().zip(avail) {
                *y += w;
            }
            self.cursor = (self.cursor + n) % self.samples.len();
            done += n;
        }
    }
}
