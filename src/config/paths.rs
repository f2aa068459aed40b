//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\throw-coach\
//!   macOS:   ~/Library/Application Support/throw-coach/
//!   Linux:   ~/.config/throw-coach/
//!
//! Data dir (recordings, session index, models):
//!   Windows: %LOCALAPPDATA%\throw-coach\
//!   macOS:   ~/Library/Application Support/throw-coach/
//!   Linux:   ~/.local/share/throw-coach/

use std::path::PathBuf;

use super::InferenceConfig;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Storage root for recorded artifacts and the session index.
    pub data_dir: PathBuf,
    /// Directory for pose model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "throw-coach";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
            data_dir,
        }
    }

    /// Location of the configured pose model.
    pub fn model_path(&self, inference: &InferenceConfig) -> PathBuf {
        self.models_dir.join(&inference.model_file)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
