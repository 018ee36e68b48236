//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rotary_core::{DialogConfig, EngineConfig, RingConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Contact directory (`name = number` per line).
    pub directory_path: PathBuf,
    /// Root of the prompt clip folders (`hello/`, `sorry/`, ...).
    pub voice_root: PathBuf,
    pub ring_interval_ms: u64,
    pub max_ring_cycles: u32,
    pub hook_poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub listen_window_ms: u64,
    pub confirm_window_ms: u64,
    pub playback_timeout_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        let data = data_dir();
        Self {
            directory_path: data.join("directory.properties"),
            voice_root: data.join("voice"),
            ring_interval_ms: 1_000,
            max_ring_cycles: 12,
            hook_poll_interval_ms: 100,
            settle_delay_ms: 1_000,
            listen_window_ms: 3_000,
            confirm_window_ms: 2_000,
            playback_timeout_ms: 5_000,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.ring_interval_ms = self.ring_interval_ms.clamp(100, 10_000);
        self.max_ring_cycles = self.max_ring_cycles.clamp(1, 60);
        self.hook_poll_interval_ms = self.hook_poll_interval_ms.clamp(10, 1_000);
        self.settle_delay_ms = self.settle_delay_ms.min(10_000);
        self.listen_window_ms = self.listen_window_ms.clamp(500, 30_000);
        self.confirm_window_ms = self.confirm_window_ms.clamp(500, 30_000);
        self.playback_timeout_ms = self.playback_timeout_ms.clamp(500, 60_000);
    }

    /// Apply `ROTARY_DIRECTORY` / `ROTARY_VOICE_ROOT` when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_path("ROTARY_DIRECTORY") {
            self.directory_path = path;
        }
        if let Some(path) = env_path("ROTARY_VOICE_ROOT") {
            self.voice_root = path;
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ring: RingConfig {
                ring_interval: Duration::from_millis(self.ring_interval_ms),
                max_ring_cycles: self.max_ring_cycles,
                hook_poll_interval: Duration::from_millis(self.hook_poll_interval_ms),
            },
            dialog: DialogConfig {
                listen_window: Duration::from_millis(self.listen_window_ms),
                confirm_window: Duration::from_millis(self.confirm_window_ms),
                playback_timeout: Duration::from_millis(self.playback_timeout_ms),
            },
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("rotary")
}

pub fn default_settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

/// Load settings, writing the normalized defaults on first run so they can be
/// edited in place.
pub fn load_or_init_settings(path: &Path) -> AppSettings {
    let settings = load_settings(path);
    if !path.exists() {
        match save_settings(path, &settings) {
            Ok(()) => info!(path = %path.display(), "default settings written"),
            Err(e) => warn!(path = %path.display(), "could not write default settings: {e}"),
        }
    }
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
