// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Settings persistence
//
// Agent configuration lives in settings.json under the platform config
// directory. Missing keys take their defaults; an unparseable file is left
// alone and the agent runs on defaults.

use crate::types::{AppError, AppResult, AppSettings};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const SETTINGS_FILE: &str = "settings.json";

pub struct SettingsStore {
    current: RwLock<AppSettings>,
    path: PathBuf,
}

impl SettingsStore {
    /// Open the settings file in the platform config directory
    pub fn new() -> AppResult<Self> {
        let dirs = directories::ProjectDirs::from("com", "offfire", "offfire")
            .ok_or_else(|| AppError::FileIo("No config directory for this platform".to_string()))?;
        let config_dir = dirs.config_dir();
        fs::create_dir_all(config_dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;

        Self::open(config_dir.join(SETTINGS_FILE))
    }

    /// Open `path`, writing defaults there when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();

        let current = match read_settings(&path)? {
            Some(settings) => settings,
            None => {
                tracing::info!("Creating {:?} with defaults", path);
                let defaults = AppSettings::default();
                write_settings(&path, &defaults)?;
                defaults
            }
        };
        tracing::debug!(backend = %current.backend_url, "Loaded settings from {:?}", path);

        Ok(Self {
            current: RwLock::new(current),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> AppSettings {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validate and persist `settings`. Memory changes only once the file is written.
    pub fn update(&self, settings: AppSettings) -> AppResult<()> {
        settings.validate()?;

        if let Err(e) = write_settings(&self.path, &settings) {
            tracing::error!("Settings not saved: {}", e);
            return Err(e);
        }

        match self.current.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        tracing::info!("Settings saved");
        Ok(())
    }
}

fn read_settings(path: &Path) -> AppResult<Option<AppSettings>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::FileIo(format!("Failed to read settings: {}", e))),
    };

    match serde_json::from_str(&content) {
        Ok(settings) => Ok(Some(settings)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable settings in {:?}: {}", path, e);
            Ok(Some(AppSettings::default()))
        }
    }
}

/// Write to a sibling temp file and rename it over `path`
fn write_settings(path: &Path, settings: &AppSettings) -> AppResult<()> {
    let content = serde_json::to_vec_pretty(settings)
        .map_err(|e| AppError::Serialization(format!("Failed to serialize settings: {}", e)))?;
    let tmp = path.with_extension("json.tmp");

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&content)?;
        file.sync_all()
    });
    written
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| AppError::FileIo(format!("Failed to write settings: {}", e)))
}
