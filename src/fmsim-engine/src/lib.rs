// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod audio;
pub mod descriptor;
pub mod engine;
pub mod mpx;
pub mod noise;
pub mod queue;
pub mod rate;
pub mod transmitter;

pub use audio::{ProgramSource, SilentSource, WavSource};
pub use descriptor::{discover_descriptors, load_descriptor, RdsDefaults};
pub use engine::{EngineSettings, SimulatorEngine};
pub use queue::UserDataQueue;
pub use transmitter::{Transmitter, TuningHandle};
