// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for fmsim-server.
//!
//! Config is loaded from the `[fmsim-server]` section of `fmsim.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./fmsim.toml`
//! 3. `~/.config/fmsim/fmsim.toml`
//! 4. `/etc/fmsim/fmsim.toml`

use std::path::PathBuf;

use fmsim_app::ConfigFile;
use fmsim_engine::{EngineSettings, RdsDefaults};
use serde::{Deserialize, Serialize};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub stations: StationsConfig,
    pub output: OutputConfig,
    /// Simulator tunables
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationsConfig {
    /// Directory scanned for `*.toml` station descriptors
    pub dir: PathBuf,
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("stations"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Raw interleaved little-endian f32 IQ file; blocks are only counted
    /// when unset
    pub path: Option<PathBuf>,
    /// Stop after this many seconds instead of waiting for Ctrl+C
    pub duration_secs: Option<u64>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        let engine = &self.engine;
        if engine.block_size == 0 {
            return Err("[engine].block_size must be > 0".to_string());
        }
        if engine.min_center_frequency_hz > engine.max_center_frequency_hz {
            return Err(
                "[engine].min_center_frequency_hz must not exceed max_center_frequency_hz"
                    .to_string(),
            );
        }
        if engine.min_gain_db > engine.max_gain_db {
            return Err("[engine].min_gain_db must not exceed max_gain_db".to_string());
        }
        if self.output.duration_secs == Some(0) {
            return Err("[output].duration_secs must be > 0 when set".to_string());
        }
        Ok(())
    }

    /// Generate an example configuration wrapped under the `[fmsim-server]`
    /// section header, suitable for use in a combined `fmsim.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "fmsim-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            stations: StationsConfig::default(),
            output: OutputConfig {
                path: Some(PathBuf::from("fmsim.iq")),
                duration_secs: Some(60),
            },
            engine: EngineSettings {
                sample_rate: 228_000,
                max_center_frequency_hz: 108_000_000.0,
                min_center_frequency_hz: 87_500_000.0,
                rds: RdsDefaults::default(),
                ..EngineSettings::default()
            },
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "fmsim-server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.stations.dir, PathBuf::from("stations"));
        assert!(config.output.path.is_none());
        assert!(config.engine.add_noise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[engine]
sample_rate = 228000
add_noise = false

[engine.rds]
call_sign = "KQED"
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.engine.sample_rate, 228_000);
        assert!(!config.engine.add_noise);
        assert_eq!(config.engine.rds.call_sign, "KQED");
        assert_eq!(config.engine.rds.short_text, RdsDefaults::default().short_text);
        assert_eq!(config.engine.block_size, EngineSettings::default().block_size);
    }

    #[test]
    fn test_example_round_trips() {
        let text = ServerConfig::example_combined_toml();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fmsim.toml");
        std::fs::write(&path, &text).unwrap();
        let config = ServerConfig::load_from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.output.duration_secs, Some(60));
        assert_eq!(config.engine.max_center_frequency_hz, 108_000_000.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.engine.min_gain_db = 10.0;
        config.engine.max_gain_db = -10.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.output.duration_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
