//! Plugin settings.
//!
//! The launcher hands its settings over in every JSON-RPC request. When it
//! does not (manual runs, tests), settings come from a YAML file found in
//! the usual locations, and finally from defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    pub voice: String,
    pub speed: f32,
    pub timeout_secs: u64,
    /// Directory holding kokoro-v1.0.onnx, voices-v1.0.bin and tokenizer.json.
    /// Empty means the plugin directory.
    pub model_dir: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "af_heart".into(),
            speed: 1.0,
            timeout_secs: 60,
            model_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub prompt_stop: String,
    pub default_prompt: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub save_conversation: bool,
    pub log_level: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub notifications: bool,
    pub tts: TtsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".into(),
            api_base: "https://generativelanguage.googleapis.com".into(),
            prompt_stop: "||".into(),
            default_prompt: "default".into(),
            save_conversation: false,
            log_level: "info".into(),
            notifications: true,
            tts: TtsConfig::default(),
        }
    }
}

/// Flow Launcher stores checkbox values as booleans, older versions as "true"/"false".
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
    })
}

/// Where the settings came from. Settings are read before logging is set
/// up, so the outcome is kept and logged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    Host,
    File(PathBuf),
    Defaults,
    Rejected(String),
}

impl SettingsSource {
    pub fn log(&self) {
        match self {
            Self::Host => info!("Using settings sent by the launcher"),
            Self::File(path) => info!("Loaded settings from {}", path.display()),
            Self::Defaults => info!("No settings file found, using defaults"),
            Self::Rejected(e) => warn!("{e}, using defaults"),
        }
    }
}

impl Settings {
    /// Load settings from YAML.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. <plugin_dir>/settings.yaml
    /// 2. ~/.config/gemini-launcher/config.yaml
    pub fn load(path: Option<&Path>, plugin_dir: &Path) -> (Self, SettingsSource) {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                Some(plugin_dir.join("settings.yaml")),
                dirs::home_dir().map(|h| h.join(".config/gemini-launcher/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            return (Self::default(), SettingsSource::Defaults);
        };

        let parsed = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read {}: {e}", config_path.display()))
            .and_then(|contents| {
                serde_yml::from_str(&contents).map_err(|e| format!("Failed to parse {}: {e}", config_path.display()))
            });

        match parsed {
            Ok(settings) => (settings, SettingsSource::File(config_path)),
            Err(e) => (Self::default(), SettingsSource::Rejected(e)),
        }
    }

    /// Settings sent by the launcher. Missing keys keep their defaults.
    pub fn from_host(value: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| format!("Invalid host settings: {e}"))
    }

    /// Filter directive for tracing-subscriber. Also accepts `WARNING`, `CRITICAL` and `NOTSET`.
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" | "notset" => "debug",
            "warning" | "warn" => "warn",
            "error" | "critical" | "fatal" => "error",
            _ => "info",
        }
    }
}
