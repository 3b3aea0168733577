//! Store settings: visibility filters and loader tuning.
//!
//! The store only exposes getters and setters; where these values are
//! persisted (and merged with other configuration sources) is owned by the
//! embedding application. All fields default so partial TOML fragments
//! deserialize cleanly.

use serde::{Deserialize, Serialize};

/// Default number of directory entries folded in per loader batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default debounce interval for directory watches, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Visibility filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Hide dotfiles and backup (`*~`) entries.
    pub hide_hidden: bool,
    /// Hide files that do not look like text.
    pub hide_binary: bool,
    /// Only show files whose name matches this glob. Directories always
    /// pass; `None` disables the pattern.
    pub pattern: Option<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            hide_hidden: true,
            hide_binary: false,
            pattern: None,
        }
    }
}

/// Directory loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Entries folded into the tree per batch.
    pub batch_size: usize,
    /// Debounce interval for per-directory change watches.
    pub debounce_ms: u64,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Top-level store settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub filter: FilterSettings,
    pub loader: LoaderSettings,
}

impl StoreSettings {
    /// Parse settings from a TOML fragment; missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize settings to TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
