//! Loader configuration
//!
//! Defaults the loader applies when a topology does not say otherwise.
//! Configuration can be loaded from a TOML or YAML file and/or environment
//! variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device_manager::DxvaMode;
use crate::negotiation::ConnectMethod;
use crate::{Error, Result};

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Connect method for nodes without a `CONNECT_METHOD` attribute
    #[serde(default = "default_connect_method", with = "connect_method_repr")]
    pub default_connect_method: ConnectMethod,

    /// Offer the video processor as a converter even when the topology does not ask for it
    #[serde(default)]
    pub enable_video_processor: bool,

    /// DXVA mode overriding the topology's own
    #[serde(default)]
    pub dxva_mode: Option<DxvaMode>,

    /// Insert sample copiers in front of device-aware sinks
    #[serde(default = "default_insert_sample_copiers")]
    pub insert_sample_copiers: bool,
}

fn default_connect_method() -> ConnectMethod {
    ConnectMethod::ALLOW_DECODER
}

fn default_insert_sample_copiers() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            default_connect_method: default_connect_method(),
            enable_video_processor: false,
            dxva_mode: None,
            insert_sample_copiers: default_insert_sample_copiers(),
        }
    }
}

impl LoaderConfig {
    /// Parse TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse YAML.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from a file; `.yaml`/`.yml` are read as YAML, anything else as TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Apply `TOPOLOAD_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(method) = std::env::var("TOPOLOAD_CONNECT_METHOD") {
            self.default_connect_method = ConnectMethod::parse(&method)?;
        }
        if let Ok(mode) = std::env::var("TOPOLOAD_DXVA_MODE") {
            self.dxva_mode = Some(match mode.trim().to_ascii_lowercase().as_str() {
                "default" => DxvaMode::Default,
                "none" => DxvaMode::None,
                "full" => DxvaMode::Full,
                other => return Err(Error::InvalidConfig(format!("unknown DXVA mode '{}'", other))),
            });
        }
        if let Ok(flag) = std::env::var("TOPOLOAD_ENABLE_XVP") {
            self.enable_video_processor = parse_bool(&flag)?;
        }
        Ok(self)
    }

    /// Load from `path` when it exists, otherwise defaults; then apply
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let config = match path {
            Some(p) if p.as_ref().exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.with_env_overrides()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!("expected a boolean, got '{}'", other))),
    }
}

/// Connect methods are written as names joined by `|` or as raw bits.
pub(crate) mod connect_method_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::manifest::ConnectMethodSpec;
    use crate::negotiation::ConnectMethod;

    pub fn serialize<S: Serializer>(method: &ConnectMethod, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&method.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConnectMethod, D::Error> {
        ConnectMethodSpec::deserialize(deserializer)?
            .resolve()
            .map_err(serde::de::Error::custom)
    }
}
