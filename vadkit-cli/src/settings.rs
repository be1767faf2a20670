//! Persistent CLI settings (JSON file in the user data directory).
//!
//! Every field is optional in the file; command-line flags override whatever
//! the file provides.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vadkit_core::vad::ExpSmoother;
use vadkit_core::DEFAULT_PRELIMINARY_SIZE;

/// Smallest preliminary arena accepted for the bounded-memory probe.
pub const MIN_PRELIMINARY_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct Settings {
    /// Engine module to load.
    pub library_path: Option<PathBuf>,
    pub access_key: Option<String>,
    /// Inference device selector for desktop builds.
    pub device: String,
    /// Detection threshold; `None` prints raw probabilities.
    pub threshold: Option<f32>,
    /// Smoothing factor of the live meter.
    pub meter_alpha: f32,
    /// Scratch arena for the bounded-memory probe, in bytes.
    pub preliminary_memory_size: usize,
    /// Capture device index; `None` selects the default input.
    pub audio_device_index: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            library_path: None,
            access_key: None,
            device: "best".into(),
            threshold: None,
            meter_alpha: ExpSmoother::DEFAULT_ALPHA,
            preliminary_memory_size: DEFAULT_PRELIMINARY_SIZE,
            audio_device_index: None,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.device = normalize_device(&self.device);
        self.threshold = self.threshold.map(|t| t.clamp(0.0, 1.0));
        self.meter_alpha = if self.meter_alpha.is_finite() {
            self.meter_alpha.clamp(0.0, 1.0)
        } else {
            ExpSmoother::DEFAULT_ALPHA
        };
        self.preliminary_memory_size = self.preliminary_memory_size.max(MIN_PRELIMINARY_SIZE);
        self.access_key = self
            .access_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
    }
}

pub fn normalize_device(raw: &str) -> String {
    let device = raw.trim();
    if device.is_empty() {
        "best".into()
    } else {
        device.to_ascii_lowercase()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vadkit")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vadkit")
            .join("settings.json")
    }
}

/// Load settings from `path`.
///
/// A missing file yields defaults. A file given explicitly (`required`)
/// must exist and parse; the default file is best-effort.
pub fn load_settings(path: &Path, required: bool) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(e) if required => {
                return Err(e).with_context(|| format!("invalid settings file {}", path.display()))
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring invalid settings file: {e}");
                Settings::default()
            }
        },
        Err(e) if required => {
            return Err(e).with_context(|| format!("cannot read settings file {}", path.display()))
        }
        Err(_) => Settings::default(),
    };
    settings.normalize();
    debug!(path = %path.display(), ?settings, "settings loaded");
    Ok(settings)
}
