use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const LOG_TARGET: &str = "cadenza::config";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenzaConfig {
    #[serde(default)]
    pub music: MusicConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    /// Root directory scanned for playlists. `~/` is expanded.
    #[serde(default = "crate::paths::default_music_dir")]
    pub music_dir: PathBuf,
    /// Cover shown while metadata is missing or unresolvable
    #[serde(default = "default_cover")]
    pub default_cover: String,
    /// Also write fetched lyrics to a `.lrc` file next to the song
    #[serde(default = "default_true")]
    pub save_lyrics_sidecar: bool,
    /// Minimum playback progress between two resume checkpoints
    #[serde(default = "default_resume_checkpoint_secs")]
    pub resume_checkpoint_secs: u64,
}

fn default_cover() -> String {
    "images/default_cover.jpg".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_resume_checkpoint_secs() -> u64 {
    5
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            music_dir: crate::paths::default_music_dir(),
            default_cover: default_cover(),
            save_lyrics_sidecar: true,
            resume_checkpoint_secs: default_resume_checkpoint_secs(),
        }
    }
}

impl MusicConfig {
    /// Music root with a leading `~/` expanded to the home directory.
    #[must_use]
    pub fn music_root(&self) -> PathBuf {
        expand_home(&self.music_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the remote metadata service (search + lyric endpoints)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.timelessq.com/music/tencent".to_string()
}

const fn default_timeout_secs() -> u64 {
    15
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default)]
    pub mode: ThemeMode,
    #[serde(default = "default_theme_color")]
    pub color: String,
    #[serde(default)]
    pub background_image: Option<String>,
}

fn default_theme_color() -> String {
    "blue".to_string()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::default(),
            color: default_theme_color(),
            background_image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
}

const fn default_window_width() -> u32 {
    1300
}

const fn default_window_height() -> u32 {
    800
}

const fn default_min_width() -> u32 {
    500
}

const fn default_min_height() -> u32 {
    400
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Mirror log output to `cadenza.log` in the config directory
    #[serde(default)]
    pub file: bool,
}

impl CadenzaConfig {
    /// Get the configuration directory path (~/.config/cadenza/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/cadenza/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create the template on first run
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read, parsed, or fails validation.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`Self::load_or_create`] for an explicit path.
    ///
    /// # Errors
    ///
    /// See [`Self::load_or_create`].
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;
            info!(target: LOG_TARGET, "Wrote config template to {:?}", config_path);

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error on TOML syntax errors or failed validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.music.music_dir.as_os_str().is_empty() {
            return Err(invalid("music.music_dir must not be empty"));
        }
        if self.music.resume_checkpoint_secs == 0 {
            return Err(invalid("music.resume_checkpoint_secs must be greater than 0"));
        }

        let base_url = self.provider.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid(format!(
                "provider.base_url must be an http(s) URL, got {base_url:?}"
            )));
        }
        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs must be greater than 0"));
        }

        if self.window.width < self.window.min_width {
            return Err(invalid("window.width is smaller than window.min_width"));
        }
        if self.window.height < self.window.min_height {
            return Err(invalid("window.height is smaller than window.min_height"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ConfigInvalid {
        message: message.into(),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Commented template written on first run
const CONFIG_TEMPLATE: &str = r##"# Cadenza Configuration
# ~/.config/cadenza/config.toml

[music]
# Root directory; every sub-directory holding .mp3 files becomes a playlist.
# Defaults to the platform music directory.
# music_dir = "~/Music"
default_cover = "images/default_cover.jpg"
# Write fetched lyrics to "<song>.lrc" beside the audio file
save_lyrics_sidecar = true
# Save the playback position at most this often while playing
resume_checkpoint_secs = 5

[provider]
base_url = "https://api.timelessq.com/music/tencent"
timeout_secs = 15
max_retries = 3

[theme]
mode = "dark"  # "dark" or "light"
color = "blue"
# background_image = "images/backgrounds/background1.jpg"

[window]
width = 1300
height = 800
min_width = 500
min_height = 400

[logging]
# Mirror logs to ~/.config/cadenza/cadenza.log
file = false
"##;
