use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use qkdnet_hardware::{DEFAULT_BACKEND, DEFAULT_BASE_URL, DEFAULT_SHOTS};
use qkdnet_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub lab: LabSection,
    #[serde(default)]
    pub hardware: HardwareSection,
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LabSection {
    /// Master seed; omitted means fresh OS entropy per process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default = "default_key_length")]
    pub key_length: u32,
    /// Intercept-resend on the quantum channel.
    #[serde(default)]
    pub eavesdropper: bool,
    /// Bit flips on the classical ciphertext channel.
    #[serde(default)]
    pub classical_eavesdropper: bool,
    /// Sent after every secure run.
    #[serde(default)]
    pub messages: Vec<String>,
    /// Directory for per-run JSON artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareMode {
    #[default]
    Disabled,
    /// Ideal in-process executor.
    Loopback,
    /// Executor that is never reachable, for exercising the fallback.
    Offline,
    Rest,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct HardwareSection {
    #[serde(default)]
    pub mode: HardwareMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_shots")]
    pub shots: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            mode: HardwareMode::default(),
            base_url: default_base_url(),
            backend: default_backend(),
            shots: default_shots(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_key_length() -> u32 {
    64
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_owned()
}

const fn default_shots() -> u32 {
    DEFAULT_SHOTS
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lab.key_length == 0 {
            return Err(ConfigError::Validation(
                "key length must be greater than zero".into(),
            ));
        }
        if let Some(index) = self.lab.messages.iter().position(|m| m.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "message {index} is empty"
            )));
        }
        let hardware = &self.hardware;
        if hardware.mode != HardwareMode::Disabled {
            if hardware.shots == 0 {
                return Err(ConfigError::Validation(
                    "hardware shots must be greater than zero".into(),
                ));
            }
            if hardware.timeout_ms == 0 || hardware.poll_interval_ms == 0 {
                return Err(ConfigError::Validation(
                    "hardware timeout and poll interval must be greater than zero".into(),
                ));
            }
        }
        if hardware.mode == HardwareMode::Rest
            && !(hardware.base_url.starts_with("http://") || hardware.base_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "hardware base url {:?} is not an http(s) url",
                hardware.base_url
            )));
        }
        Ok(())
    }

    pub fn sample() -> Self {
        Self {
            lab: LabSection {
                seed: Some(84),
                key_length: default_key_length(),
                eavesdropper: false,
                classical_eavesdropper: false,
                messages: vec!["hello bob".into(), "meet at noon".into()],
                export_dir: None,
            },
            hardware: HardwareSection {
                mode: HardwareMode::Loopback,
                ..HardwareSection::default()
            },
            telemetry: TelemetryConfig::sample("http://localhost:4318"),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Parse {
            format: ConfigFormat::Toml,
            details: err.to_string(),
        })
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents, resolve_format(path, format))
}

pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
    }?;
    config.validate()?;
    Ok(config)
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_key_length() {
        let mut config = Config::sample();
        config.lab.key_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_blank_messages() {
        let mut config = Config::sample();
        config.lab.messages.push("  ".into());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rest_mode_needs_http_url() {
        let mut config = Config::sample();
        config.hardware.mode = HardwareMode::Rest;
        config.hardware.base_url = "localhost:5000".into();
        assert!(config.validate().is_err());
        config.hardware.base_url = "http://localhost:5000/api".into();
        config.validate().unwrap();
    }

    #[test]
    fn parses_toml_config() {
        let contents = r#"
            [lab]
            seed = 7
            key-length = 128
            eavesdropper = true
            messages = ["ping"]

            [hardware]
            mode = "rest"
            base-url = "http://lab:5000/api"
            timeout-ms = 5000

            [telemetry]
            endpoint = "http://localhost:4318"
        "#;
        let config = parse_config(contents, ConfigFormat::Toml).unwrap();
        assert_eq!(config.lab.seed, Some(7));
        assert_eq!(config.lab.key_length, 128);
        assert!(config.lab.eavesdropper);
        assert!(!config.lab.classical_eavesdropper);
        assert_eq!(config.hardware.mode, HardwareMode::Rest);
        assert_eq!(config.hardware.shots, DEFAULT_SHOTS);
        assert_eq!(config.hardware.timeout_ms, 5000);
    }

    #[test]
    fn parses_yaml_config() {
        let contents = r#"
            lab:
              key-length: 32
              classical-eavesdropper: true
            telemetry:
              endpoint: http://localhost:4318
        "#;
        let config = parse_config(contents, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.lab.key_length, 32);
        assert!(config.lab.classical_eavesdropper);
        assert_eq!(config.hardware.mode, HardwareMode::Disabled);
        assert!(config.lab.seed.is_none());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            resolve_format(Path::new("lab.yml"), ConfigFormat::Auto),
            ConfigFormat::Yaml
        );
        assert_eq!(
            resolve_format(Path::new("lab.conf"), ConfigFormat::Auto),
            ConfigFormat::Toml
        );
        assert_eq!(
            resolve_format(Path::new("lab.toml"), ConfigFormat::Yaml),
            ConfigFormat::Yaml
        );
    }

    #[test]
    fn sample_is_reloadable() {
        let sample = Config::sample();
        let rendered = sample.to_toml().unwrap();
        assert_eq!(parse_config(&rendered, ConfigFormat::Toml).unwrap(), sample);
    }
}
