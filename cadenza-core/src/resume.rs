//! Persistence of playback modes, volume and per-playlist resume points.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::library::ALL_SONGS_PLAYLIST;

const LOG_TARGET: &str = "cadenza::resume";

/// Where playback stopped in one playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistState {
    /// Absolute path of the last song, empty when nothing was played yet
    #[serde(default)]
    pub last_song_path: String,
    /// Milliseconds into that song
    #[serde(default)]
    pub last_position: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackModes {
    pub shuffle: bool,
    pub repeat: bool,
    pub single_repeat: bool,
}

/// The settings document as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub current_playlist: String,
    pub shuffle_mode: bool,
    pub repeat_mode: bool,
    pub single_repeat_mode: bool,
    pub volume: f32,
    pub playlist_states: BTreeMap<String, PlaylistState>,
    /// Mirror of the most recent per-playlist save
    pub current_song_path: String,
    pub last_position: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current_playlist: ALL_SONGS_PLAYLIST.to_string(),
            shuffle_mode: false,
            repeat_mode: false,
            single_repeat_mode: false,
            volume: 1.0,
            playlist_states: BTreeMap::new(),
            current_song_path: String::new(),
            last_position: 0,
        }
    }
}

/// Owner of the settings document.
///
/// Every mutation rewrites the whole document right away; a write failure
/// is logged and the in-memory state stays authoritative.
#[derive(Debug)]
pub struct ResumeStore {
    path: Option<PathBuf>,
    settings: Settings,
}

impl ResumeStore {
    /// Open the document at `path`. A missing or unreadable file yields defaults.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = read_document(&path).unwrap_or_default();
        Self {
            path: Some(path),
            settings,
        }
    }

    /// A store that never touches the filesystem
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            settings: Settings::default(),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Upsert the resume point of `playlist` and mirror it globally
    pub fn save(&mut self, playlist: &str, song_path: &Path, position_ms: u64) {
        let song_path = song_path.to_string_lossy().into_owned();
        self.settings.playlist_states.insert(
            playlist.to_string(),
            PlaylistState {
                last_song_path: song_path.clone(),
                last_position: position_ms,
            },
        );
        self.settings.current_song_path = song_path;
        self.settings.last_position = position_ms;
        self.persist();
    }

    /// Saved song and position for `playlist`, if any song was recorded
    #[must_use]
    pub fn load(&self, playlist: &str) -> Option<(PathBuf, u64)> {
        self.settings
            .playlist_states
            .get(playlist)
            .filter(|state| !state.last_song_path.is_empty())
            .map(|state| (PathBuf::from(&state.last_song_path), state.last_position))
    }

    /// Give every named playlist an empty record if it has none
    pub fn ensure_playlists<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut added = 0usize;
        for name in names {
            if !self.settings.playlist_states.contains_key(name) {
                self.settings
                    .playlist_states
                    .insert(name.to_string(), PlaylistState::default());
                added += 1;
            }
        }
        if added > 0 {
            debug!(target: LOG_TARGET, "Added {} playlist records", added);
            self.persist();
        }
    }

    #[must_use]
    pub fn current_playlist(&self) -> &str {
        &self.settings.current_playlist
    }

    pub fn set_current_playlist(&mut self, name: &str) {
        if self.settings.current_playlist != name {
            self.settings.current_playlist = name.to_string();
            self.persist();
        }
    }

    #[must_use]
    pub const fn modes(&self) -> PlaybackModes {
        PlaybackModes {
            shuffle: self.settings.shuffle_mode,
            repeat: self.settings.repeat_mode,
            single_repeat: self.settings.single_repeat_mode,
        }
    }

    pub fn set_modes(&mut self, modes: PlaybackModes) {
        self.settings.shuffle_mode = modes.shuffle;
        self.settings.repeat_mode = modes.repeat;
        self.settings.single_repeat_mode = modes.single_repeat;
        self.persist();
    }

    /// Configured volume in `[0, 1]`
    #[must_use]
    pub fn volume(&self) -> f32 {
        sanitize_volume(self.settings.volume)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.settings.volume = sanitize_volume(volume);
        self.persist();
    }

    /// Write the document now.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.settings)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            warn!(target: LOG_TARGET, "Failed to write settings document: {}", e);
        }
    }
}

fn sanitize_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        1.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn read_document(path: &Path) -> Option<Settings> {
    if !path.exists() {
        info!(target: LOG_TARGET, "No settings document at {:?}, using defaults", path);
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => {
                info!(target: LOG_TARGET, "Loaded settings from {:?}", path);
                Some(settings)
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to parse settings document: {}", e);
                None
            }
        },
        Err(e) => {
            warn!(target: LOG_TARGET, "Failed to read settings document: {}", e);
            None
        }
    }
}
