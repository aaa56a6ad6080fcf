// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Station descriptor files.
//!
//! One TOML file per station:
//!
//! ```toml
//! FileName = "program.wav"
//! CenterFrequency = 88500000
//!
//! [RDS]
//! CallSign = "KQED"
//! ShortText = "NEWS"
//! FullText = "All news, all the time"
//! ```
//!
//! `FileName` is resolved against the descriptor's directory.

use std::path::{Path, PathBuf};

use fmsim_core::constants::{DEFAULT_CALL_SIGN, DEFAULT_LONG_TEXT, DEFAULT_SHORT_TEXT};
use fmsim_core::{SimError, SimResult, StationConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DESCRIPTOR_EXTENSION: &str = "toml";

#[derive(Debug, Deserialize)]
struct StationDescriptor {
    #[serde(rename = "FileName")]
    file_name: Option<String>,
    #[serde(rename = "CenterFrequency")]
    center_frequency: Option<f64>,
    #[serde(rename = "RDS", default)]
    rds: RdsSection,
}

#[derive(Debug, Default, Deserialize)]
struct RdsSection {
    #[serde(rename = "CallSign")]
    call_sign: Option<String>,
    #[serde(rename = "ShortText")]
    short_text: Option<String>,
    #[serde(rename = "FullText")]
    full_text: Option<String>,
}

/// RDS fields used when a descriptor leaves them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsDefaults {
    pub call_sign: String,
    pub short_text: String,
    pub long_text: String,
}

impl Default for RdsDefaults {
    fn default() -> Self {
        Self {
            call_sign: DEFAULT_CALL_SIGN.to_string(),
            short_text: DEFAULT_SHORT_TEXT.to_string(),
            long_text: DEFAULT_LONG_TEXT.to_string(),
        }
    }
}

fn config_error(path: &Path, msg: impl Into<String>) -> SimError {
    SimError::Config(path.to_path_buf(), msg.into())
}

/// Parse one descriptor into a station configuration.
pub fn load_descriptor(path: &Path, defaults: &RdsDefaults) -> SimResult<StationConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| config_error(path, e.to_string()))?;
    let desc: StationDescriptor =
        toml::from_str(&content).map_err(|e| config_error(path, e.to_string()))?;

    let file_name = desc
        .file_name
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| config_error(path, "FileName is required"))?;
    let center = desc
        .center_frequency
        .ok_or_else(|| config_error(path, "CenterFrequency is required"))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let source = base.join(file_name.trim());
    if !source.is_file() {
        return Err(config_error(
            path,
            format!("program file {} does not exist", source.display()),
        ));
    }

    let rds = desc.rds;
    let station = StationConfig::new(source, center)
        .with_call_sign(rds.call_sign.as_deref().unwrap_or(&defaults.call_sign))
        .with_short_text(rds.short_text.as_deref().unwrap_or(&defaults.short_text))
        .with_long_text(rds.full_text.as_deref().unwrap_or(&defaults.long_text));
    debug!(
        "Loaded {}: {} at {} Hz",
        path.display(),
        station.call_sign(),
        station.center_frequency_hz
    );
    Ok(station)
}

/// All descriptor files in `dir`, sorted by name.
pub fn discover_descriptors(dir: &Path) -> SimResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| config_error(dir, e.to_string()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(DESCRIPTOR_EXTENSION))
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("song.wav"), b"RIFF").unwrap();
        dir
    }

    #[test]
    fn full_descriptor_loads() {
        let dir = setup();
        let path = dir.path().join("kqed.toml");
        fs::write(
            &path,
            "FileName = \"song.wav\"\nCenterFrequency = 88500000\n\n[RDS]\nCallSign = \"KQED\"\nShortText = \"NEWS\"\nFullText = \"All news\"\n",
        )
        .unwrap();

        let station = load_descriptor(&path, &RdsDefaults::default()).unwrap();
        assert_eq!(station.source, dir.path().join("song.wav"));
        assert_eq!(station.center_frequency_hz, 88.5e6);
        assert_eq!(station.call_sign(), "KQED");
        assert_eq!(station.short_text(), "NEWS");
        assert_eq!(station.long_text(), "All news");
    }

    #[test]
    fn missing_rds_section_uses_defaults() {
        let dir = setup();
        let path = dir.path().join("plain.toml");
        fs::write(&path, "FileName = \"song.wav\"\nCenterFrequency = 101.1e6\n").unwrap();
        let defaults = RdsDefaults {
            call_sign: "KX".into(),
            ..RdsDefaults::default()
        };

        let station = load_descriptor(&path, &defaults).unwrap();
        assert_eq!(station.call_sign(), "WWKX");
        assert_eq!(station.short_text(), DEFAULT_SHORT_TEXT);
    }

    #[test]
    fn missing_required_fields_are_config_errors() {
        let dir = setup();
        let no_file = dir.path().join("a.toml");
        fs::write(&no_file, "CenterFrequency = 1.0\n").unwrap();
        let no_freq = dir.path().join("b.toml");
        fs::write(&no_freq, "FileName = \"song.wav\"\n").unwrap();
        let bad_audio = dir.path().join("c.toml");
        fs::write(&bad_audio, "FileName = \"gone.wav\"\nCenterFrequency = 1.0\n").unwrap();
        let garbage = dir.path().join("d.toml");
        fs::write(&garbage, "FileName = \n").unwrap();

        for path in [no_file, no_freq, bad_audio, garbage] {
            let err = load_descriptor(&path, &RdsDefaults::default()).unwrap_err();
            assert!(matches!(err, SimError::Config(ref p, _) if *p == path), "{err}");
        }
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = setup();
        for name in ["b.toml", "a.toml", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.toml")).unwrap();
        let found = discover_descriptors(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.toml"), dir.path().join("b.toml")]);
    }

    #[test]
    fn unreadable_directory_is_config_error() {
        let err = discover_descriptors(Path::new("/nonexistent/fmsim/stations")).unwrap_err();
        assert!(matches!(err, SimError::Config(..)));
    }
}
