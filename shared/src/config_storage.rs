//! Configuration storage for instrument settings and calibration files.
//!
//! Provides a single directory holding the instrument parameter file and the
//! saved flat-field models. All config is stored in ~/.vtl_config/ by default.

use crate::settings::{InstrumentSettings, SettingsError};
use log::info;
use std::path::{Path, PathBuf};

/// Name of the instrument parameter file inside the storage root
pub const SETTINGS_FILE: &str = "parameters.json";

/// Configuration storage manager.
///
/// Manages loading and saving of instrument settings and flat-field model
/// files from a centralized directory (defaults to ~/.vtl_config/).
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.vtl_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.vtl_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".vtl_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    // =========================================================================
    // Instrument settings
    // =========================================================================

    /// Get the instrument parameter file path
    pub fn settings_path(&self) -> PathBuf {
        self.root_path.join(SETTINGS_FILE)
    }

    /// Load the instrument settings, creating the file from defaults if absent.
    pub fn load_settings(&self) -> Result<InstrumentSettings, SettingsError> {
        let path = self.settings_path();

        if path.exists() {
            let settings = InstrumentSettings::load_from_file(&path)?;
            info!("Loaded settings from {}", path.display());
            return Ok(settings);
        }

        let settings = InstrumentSettings::default();
        self.save_settings(&settings)?;
        info!("Created settings file {}", path.display());
        Ok(settings)
    }

    /// Save the instrument settings.
    ///
    /// Creates the config directory if it doesn't exist.
    /// Returns the path where the settings were saved.
    pub fn save_settings(&self, settings: &InstrumentSettings) -> Result<PathBuf, SettingsError> {
        settings.validate()?;
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.settings_path();
        settings.save_to_file(&path)?;
        Ok(path)
    }

    // =========================================================================
    // Flat-field models
    // =========================================================================

    /// Get the flat-field model directory path
    pub fn flatfield_dir(&self) -> PathBuf {
        self.root_path.join("flatfield")
    }

    /// File path for a named flat-field model.
    ///
    /// Path separators in the name are replaced so the file always lands
    /// inside the flat-field directory.
    pub fn flatfield_path(&self, name: &str) -> PathBuf {
        let safe = name.replace(['/', '\\'], "_");
        self.flatfield_dir().join(format!("{safe}.json"))
    }

    /// Create the flat-field directory and return the path for a named model
    pub fn prepare_flatfield_path(&self, name: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(self.flatfield_dir())?;
        Ok(self.flatfield_path(name))
    }

    /// List the names of all stored flat-field models, sorted.
    pub fn list_flatfield_models(&self) -> std::io::Result<Vec<String>> {
        let dir = self.flatfield_dir();

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a stored flat-field model.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_flatfield_model(&self, name: &str) -> std::io::Result<bool> {
        let path = self.flatfield_path(name);

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(path)?;
        Ok(true)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".vtl_config")))
    }
}
