// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Malformed or missing descriptor field, unreadable descriptor, or
    /// engine misconfiguration.
    #[error("Configuration error in {0}: {1}")]
    Config(PathBuf, String),

    #[error("{name} {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },

    /// Program source could not be opened or read.
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, String),
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_bounds() {
        let err = SimError::OutOfRange {
            name: "gain",
            value: 120.0,
            min: -100.0,
            max: 100.0,
        };
        assert_eq!(
            err.to_string(),
            "gain 120 is outside the allowed range [-100, 100]"
        );
    }
}
