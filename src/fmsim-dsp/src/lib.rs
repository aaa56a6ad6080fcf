// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Signal-processing building blocks: filter design, FIR filtering,
//! FM modulation, frequency translation and the ring buffer they share.

pub mod filter_design;
pub mod fir;
pub mod modulator;
pub mod ring;
pub mod tuner;

pub use filter_design::{DesignParams, FilterType};
pub use fir::FirFilter;
pub use modulator::FrequencyModulator;
pub use ring::RingBuffer;
pub use tuner::Tuner;
