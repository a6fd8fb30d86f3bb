use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{EngineOptions, EngineState, EngineStatus};
use crate::media::buffer::DEFAULT_CAPACITY;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    pub version: u32,
    pub playlist: Vec<String>,
    /// Base directory for relative playlist entries.
    pub media_dir: Option<String>,
    pub rotation_secs: f64,
    pub brightness: f64,
    pub on: bool,
    pub buffer_capacity: usize,
    /// Draw the wall in the terminal instead of running headless.
    pub preview: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version: 1,
            playlist: Vec::new(),
            media_dir: None,
            rotation_secs: 10.0,
            brightness: 0.5,
            on: true,
            buffer_capacity: DEFAULT_CAPACITY,
            preview: false,
        }
    }
}

impl SettingsConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pixelwall").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::default_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to save settings to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialize settings: {e}"),
        }
    }

    /// Resolve a playlist entry: absolute paths pass through, relative ones
    /// are joined onto `media_dir` when it is set.
    pub fn resolve(&self, entry: &str) -> PathBuf {
        let path = PathBuf::from(entry);
        match &self.media_dir {
            Some(dir) if path.is_relative() => Path::new(dir).join(path),
            _ => path,
        }
    }

    pub fn resolved_playlist(&self) -> Vec<PathBuf> {
        self.playlist.iter().map(|e| self.resolve(e)).collect()
    }

    /// Copy the engine's live on/off, rotation and brightness state.
    pub fn record_status(&mut self, status: &EngineStatus) {
        self.on = status.state != EngineState::Off;
        self.rotation_secs = status.rotation_secs;
        self.brightness = status.brightness;
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            rotation_secs: self.rotation_secs,
            brightness: self.brightness,
            on: self.on,
            buffer_capacity: self.buffer_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: SettingsConfig = serde_json::from_str(r#"{"rotation_secs": 3.5}"#).unwrap();
        assert_eq!(cfg.rotation_secs, 3.5);
        assert_eq!(cfg.brightness, 0.5);
        assert!(cfg.on);
        assert_eq!(cfg.buffer_capacity, DEFAULT_CAPACITY);
        assert!(cfg.playlist.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let cfg = SettingsConfig {
            playlist: vec!["a.png".into(), "/abs/b.gif".into()],
            media_dir: Some("/srv/media".into()),
            on: false,
            ..SettingsConfig::default()
        };
        cfg.save_to(&path);
        assert_eq!(SettingsConfig::load_from(&path), cfg);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(SettingsConfig::load_from(&path), SettingsConfig::default());
        assert_eq!(
            SettingsConfig::load_from(&dir.path().join("absent.json")),
            SettingsConfig::default()
        );
    }

    #[test]
    fn live_state_keeps_exact_brightness() {
        let status = EngineStatus {
            state: EngineState::Off,
            current: None,
            next: None,
            playlist_len: 0,
            live_workers: 0,
            rotation_secs: 7.5,
            brightness: 0.333,
            brightness_percent: 33,
        };
        let mut cfg = SettingsConfig::default();
        cfg.record_status(&status);
        assert_eq!(cfg.brightness, 0.333);
        assert_eq!(cfg.rotation_secs, 7.5);
        assert!(!cfg.on);
    }

    #[test]
    fn relative_entries_resolve_against_media_dir() {
        let cfg = SettingsConfig {
            media_dir: Some("/srv/media".into()),
            ..SettingsConfig::default()
        };
        assert_eq!(cfg.resolve("a.png"), PathBuf::from("/srv/media/a.png"));
        assert_eq!(cfg.resolve("/tmp/b.png"), PathBuf::from("/tmp/b.png"));

        let bare = SettingsConfig::default();
        assert_eq!(bare.resolve("a.png"), PathBuf::from("a.png"));
    }
}
