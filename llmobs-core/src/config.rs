use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{CoreResult, LlmObsError};

pub const DEFAULT_MAX_SAMPLES_STORED: usize = 10_000;

fn default_true() -> bool {
    true
}
fn default_max_samples_stored() -> usize {
    DEFAULT_MAX_SAMPLES_STORED
}
fn default_vendor_name() -> String {
    "OpenAI".to_string()
}
fn default_vendor_version() -> String {
    "unknown".to_string()
}
fn default_agent_language() -> String {
    "Rust".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AiMonitoringCfg {
    /// When false, instrumented providers are pure pass-throughs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When false, message content and embedding input are left off events.
    #[serde(default = "default_true")]
    pub record_content: bool,
    /// Events buffered between harvests; extra events are dropped and counted.
    #[serde(default = "default_max_samples_stored")]
    pub max_samples_stored: usize,
}

impl Default for AiMonitoringCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            record_content: true,
            max_samples_stored: default_max_samples_stored(),
        }
    }
}

/// Identity of the instrumented provider library; used in segment and metric names.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VendorCfg {
    #[serde(default = "default_vendor_name")]
    pub name: String,
    #[serde(default = "default_vendor_version")]
    pub version: String,
    #[serde(default = "default_agent_language")]
    pub agent_language: String,
}

impl Default for VendorCfg {
    fn default() -> Self {
        Self {
            name: default_vendor_name(),
            version: default_vendor_version(),
            agent_language: default_agent_language(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub ai_monitoring: AiMonitoringCfg,
    #[serde(default)]
    pub vendor: VendorCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(LlmObsError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| LlmObsError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| LlmObsError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| LlmObsError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| LlmObsError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| LlmObsError::Other(e.into())))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.ai_monitoring.max_samples_stored == 0 {
            return Err(LlmObsError::Validation(
                "ai_monitoring.max_samples_stored must be greater than 0".into(),
            ));
        }
        if self.vendor.name.trim().is_empty() {
            return Err(LlmObsError::Validation("vendor.name must not be empty".into()));
        }
        if self.vendor.agent_language.trim().is_empty() {
            return Err(LlmObsError::Validation(
                "vendor.agent_language must not be empty".into(),
            ));
        }
        Ok(())
    }
}
