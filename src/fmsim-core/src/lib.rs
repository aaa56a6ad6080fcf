// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod constants;
pub mod error;
pub mod sink;
pub mod station;

/// Complex baseband sample exchanged between pipeline stages.
pub type Sample = num_complex::Complex<f32>;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use error::{SimError, SimResult};
pub use sink::SampleSink;
pub use station::StationConfig;
