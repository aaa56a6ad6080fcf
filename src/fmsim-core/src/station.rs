// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-station configuration and RDS text normalization.

use std::path::PathBuf;

use tracing::warn;

use crate::constants::{
    CALL_SIGN_LEN, DEFAULT_CALL_SIGN, DEFAULT_LONG_TEXT, DEFAULT_SHORT_TEXT, LONG_TEXT_LEN,
    SHORT_TEXT_LEN,
};

/// Everything needed to bring one simulated transmitter on air.
///
/// Text fields are normalized when set, so consumers can rely on
/// `call_sign` being exactly four characters and the texts being printable
/// ASCII within their RDS limits.
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    /// Program audio (WAV file).
    pub source: PathBuf,
    /// Carrier frequency of the station (Hz).
    pub center_frequency_hz: f64,
    call_sign: String,
    short_text: String,
    long_text: String,
}

impl StationConfig {
    pub fn new(source: impl Into<PathBuf>, center_frequency_hz: f64) -> Self {
        Self {
            source: source.into(),
            center_frequency_hz,
            call_sign: DEFAULT_CALL_SIGN.to_string(),
            short_text: DEFAULT_SHORT_TEXT.to_string(),
            long_text: DEFAULT_LONG_TEXT.to_string(),
        }
    }

    pub fn call_sign(&self) -> &str {
        &self.call_sign
    }

    pub fn short_text(&self) -> &str {
        &self.short_text
    }

    pub fn long_text(&self) -> &str {
        &self.long_text
    }

    pub fn set_call_sign(&mut self, call_sign: &str) {
        self.call_sign = normalize_call_sign(call_sign);
    }

    pub fn set_short_text(&mut self, text: &str) {
        self.short_text = clamp_text(text, SHORT_TEXT_LEN, "short text");
    }

    pub fn set_long_text(&mut self, text: &str) {
        self.long_text = clamp_text(text, LONG_TEXT_LEN, "long text");
    }

    pub fn with_call_sign(mut self, call_sign: &str) -> Self {
        self.set_call_sign(call_sign);
        self
    }

    pub fn with_short_text(mut self, text: &str) -> Self {
        self.set_short_text(text);
        self
    }

    pub fn with_long_text(mut self, text: &str) -> Self {
        self.set_long_text(text);
        self
    }
}

/// Upper-case the call sign, then truncate or left-pad with 'W' to four
/// characters.
pub fn normalize_call_sign(raw: &str) -> String {
    let mut sign: String = raw.trim().chars().map(sanitize_char).collect();
    sign.make_ascii_uppercase();
    let len = sign.chars().count();
    if len > CALL_SIGN_LEN {
        warn!("Call sign '{}' longer than {} characters, truncating", sign, CALL_SIGN_LEN);
        sign.chars().take(CALL_SIGN_LEN).collect()
    } else {
        let mut padded = "W".repeat(CALL_SIGN_LEN - len);
        padded.push_str(&sign);
        padded
    }
}

/// Replace non-printable characters and truncate to `max` characters.
pub fn clamp_text(raw: &str, max: usize, what: &str) -> String {
    let text: String = raw.chars().map(sanitize_char).collect();
    if text.chars().count() > max {
        warn!("RDS {} longer than {} characters, truncating: '{}'", what, max, text);
        text.chars().take(max).collect()
    } else {
        text
    }
}

fn sanitize_char(c: char) -> char {
    if (' '..='~').contains(&c) {
        c
    } else {
        ' '
    }
}
