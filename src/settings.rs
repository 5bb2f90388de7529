use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::brush::MAX_BRUSH_SIZE;
use crate::canvas::Origin;
use crate::fill::{Connectivity, DEFAULT_TOLERANCE};
use crate::history::{DEFAULT_MAX_BYTES, DEFAULT_MAX_RECORDS};

const SETTINGS_FILE: &str = "spritecore_settings.toml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Engine configuration. Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_undo_steps: usize,
    pub max_undo_bytes: usize,
    pub max_brush_size: u32,
    /// Worker threads for brush/fill passes; 0 uses rayon's default.
    pub worker_threads: usize,
    pub gpu_acceleration: bool,
    /// "high performance" or "low power".
    pub preferred_gpu: String,
    pub pixel_perfect: bool,
    pub fill_tolerance: u8,
    pub fill_contiguous: bool,
    pub fill_connectivity: Connectivity,
    pub origin: Origin,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_MAX_RECORDS,
            max_undo_bytes: DEFAULT_MAX_BYTES,
            max_brush_size: MAX_BRUSH_SIZE,
            worker_threads: 0,
            gpu_acceleration: true,
            preferred_gpu: "high performance".to_string(),
            pixel_perfect: false,
            fill_tolerance: DEFAULT_TOLERANCE,
            fill_contiguous: true,
            fill_connectivity: Connectivity::Four,
            origin: Origin::TopLeft,
        }
    }
}

impl EngineSettings {
    /// Read from `path`. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(SettingsError::Io { path: path.to_path_buf(), source }),
        };
        toml::from_str(&text).map_err(|source| SettingsError::Parse { path: path.to_path_buf(), source })
    }

    /// Load from the per-user location, falling back to defaults (with a
    /// warning) on any error.
    pub fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| SettingsError::Io { path: path.to_path_buf(), source })
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        match settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }
}

/// Per-user settings file.
///
/// On Linux:   ~/.config/spritecore/spritecore_settings.toml  (XDG_CONFIG_HOME respected)
/// On Windows: %APPDATA%\spritecore\spritecore_settings.toml
/// On macOS:   ~/Library/Application Support/spritecore/spritecore_settings.toml
/// Fallback:   same directory as the executable.
pub fn settings_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("spritecore");
        let _ = std::fs::create_dir_all(&config_dir);
        return Some(config_dir.join(SETTINGS_FILE));
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
        let config_dir = PathBuf::from(appdata).join("spritecore");
        let _ = std::fs::create_dir_all(&config_dir);
        return Some(config_dir.join(SETTINGS_FILE));
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        let config_dir = PathBuf::from(home).join("Library").join("Application Support").join("spritecore");
        let _ = std::fs::create_dir_all(&config_dir);
        return Some(config_dir.join(SETTINGS_FILE));
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
    }
}
