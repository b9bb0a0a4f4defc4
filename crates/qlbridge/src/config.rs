//! Configuration for the injected bridge.
//!
//! Read from a TOML file named by `QLBRIDGE_CONFIG` (default
//! `qlbridge.toml` in the server's working directory). Every field has a
//! default, so a missing file or section simply means "use defaults".

use bridge_events::{BridgeSettings, DEFAULT_MAX_TEXT_LEN};
use bridge_hooks::OffsetTable;
use script_runtime::ScriptSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::BridgeError;

pub const CONFIG_ENV_VAR: &str = "QLBRIDGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "qlbridge.toml";

#[cfg(target_pointer_width = "64")]
const DEFAULT_PROCESS_NAME: &str = "qzeroded.x64";
#[cfg(not(target_pointer_width = "64"))]
const DEFAULT_PROCESS_NAME: &str = "qzeroded.x86";

#[cfg(target_pointer_width = "64")]
const DEFAULT_GAME_MODULE: &str = "qagamex64.so";
#[cfg(not(target_pointer_width = "64"))]
const DEFAULT_GAME_MODULE: &str = "qagamei386.so";

fn default_script_directory() -> String {
    "scripts".to_string()
}
fn default_entry() -> String {
    "init.lua".to_string()
}
fn default_true() -> bool {
    true
}
fn default_level() -> String {
    "info".to_string()
}
fn default_process_name() -> String {
    DEFAULT_PROCESS_NAME.to_string()
}
fn default_game_module() -> String {
    DEFAULT_GAME_MODULE.to_string()
}
fn default_max_text_len() -> usize {
    DEFAULT_MAX_TEXT_LEN
}
/// Configstrings the engine rewrites every frame.
fn default_configstring_skip() -> Vec<i32> {
    std::iter::once(16).chain(662..=669).collect()
}

/// Bridge configuration loaded from a TOML file.
///
/// Every section and field has a default, so an empty file and a missing
/// file both give a working bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Script discovery and loading
    #[serde(default)]
    pub scripts: ScriptConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Which process and functions to hook, and offset fallbacks
    #[serde(default)]
    pub hooks: HookSettings,
    /// Event dispatch limits and filters
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Directory holding `*.lua` scripts
    #[serde(default = "default_script_directory")]
    pub directory: String,
    /// Script loaded before all others
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Whether scripts load as soon as the engine is ready
    #[serde(default = "default_true")]
    pub auto_load: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            directory: default_script_directory(),
            entry: default_entry(),
            auto_load: true,
        }
    }
}

/// Log output format, level and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
    /// Optional file for log output in addition to stdout
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSettings {
    /// Logical function names never to hook
    #[serde(default)]
    pub disabled: Vec<String>,
    /// The bridge stays dormant in any other process
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default = "default_game_module")]
    pub game_module: String,
    /// Fallback offsets per build id
    #[serde(default)]
    pub offsets: OffsetTable,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            process_name: default_process_name(),
            game_module: default_game_module(),
            offsets: OffsetTable::default(),
        }
    }
}

impl HookSettings {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Cap for replacement text, in bytes
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
    #[serde(default = "default_configstring_skip")]
    pub configstring_skip: Vec<i32>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_text_len: default_max_text_len(),
            configstring_skip: default_configstring_skip(),
        }
    }
}

impl BridgeConfig {
    /// Path named by `QLBRIDGE_CONFIG`, or `qlbridge.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, BridgeError> {
        toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Loads the configuration at `path`, falling back to defaults.
    ///
    /// # Arguments
    ///
    /// * `path` - Usually [`BridgeConfig::default_path`]
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration. This never fails: a missing
    /// file means defaults, and an unreadable or invalid one is reported and
    /// replaced by defaults, since the bridge must not stop the server.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }
        let config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("⚠️ Ignoring configuration {}: {}", path.display(), e);
                return Self::default();
            }
        };
        if let Err(e) = config.validate() {
            warn!("⚠️ Invalid configuration {}: {}, using defaults", path.display(), e);
            return Self::default();
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.scripts.directory.is_empty() {
            return Err("Script directory cannot be empty".to_string());
        }

        if self.dispatch.max_text_len == 0 {
            return Err("dispatch.max_text_len must be greater than 0".to_string());
        }

        if self.hooks.process_name.is_empty() {
            return Err("hooks.process_name cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn script_settings(&self) -> ScriptSettings {
        ScriptSettings {
            directory: PathBuf::from(&self.scripts.directory),
            entry: self.scripts.entry.clone(),
        }
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            max_text_len: self.dispatch.max_text_len,
        }
    }
}
