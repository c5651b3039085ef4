//! The playback state machine.
//!
//! A [`PlaybackSession`] owns the live playback state, drives a
//! [`Transport`], persists resume points through its [`ResumeStore`] and asks
//! for metadata by sending [`ResolveRequest`]s. Results come back through
//! [`PlaybackSession::apply_metadata`], which discards anything issued for a
//! song that is no longer current.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::MusicConfig;
use crate::error::{CoreError, Result};
use crate::events::{NowPlaying, SessionEvent};
use crate::library::{Catalog, Song, ALL_SONGS_PLAYLIST};
use crate::lrc::DisplayLyrics;
use crate::metadata::{MetadataOrigin, Resolution};
use crate::resume::{PlaybackModes, ResumeStore};
use crate::transport::{Transport, TransportEvent};

const LOG_TARGET: &str = "cadenza::session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    /// No songs loaded
    #[default]
    Idle,
    /// A song is selected but not playing
    Stopped,
    Playing,
    Paused,
}

/// Request to resolve metadata for the song that just became current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub generation: u64,
    pub song: Song,
    pub force_next_candidate: bool,
}

/// Answer to a [`ResolveRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub generation: u64,
    pub path: PathBuf,
    pub resolution: Resolution,
}

/// Live playback state
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Playlist being browsed and navigated by next/previous
    pub displayed_playlist: String,
    /// Playlist the current song was started from
    pub playback_playlist: String,
    /// Index into the displayed playlist
    pub current_index: usize,
    pub now_playing: Option<Song>,
    pub modes: PlaybackModes,
    pub mute: bool,
    pub volume: f32,
    pub position_ms: u64,
    pub status: PlayerStatus,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            displayed_playlist: ALL_SONGS_PLAYLIST.to_string(),
            playback_playlist: ALL_SONGS_PLAYLIST.to_string(),
            current_index: 0,
            now_playing: None,
            modes: PlaybackModes::default(),
            mute: false,
            volume: 1.0,
            position_ms: 0,
            status: PlayerStatus::Idle,
        }
    }
}

pub struct PlaybackSession<T: Transport> {
    transport: T,
    resume: ResumeStore,
    catalog: Arc<Catalog>,
    state: PlaybackState,
    now_playing: Option<NowPlaying>,
    active_line: usize,
    generation: u64,
    last_checkpoint_ms: u64,
    checkpoint_interval_ms: u64,
    default_cover: String,
    rng: StdRng,
    resolve_tx: mpsc::UnboundedSender<ResolveRequest>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> PlaybackSession<T> {
    #[must_use]
    pub fn new(
        transport: T,
        resume: ResumeStore,
        music: &MusicConfig,
        resolve_tx: mpsc::UnboundedSender<ResolveRequest>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let modes = resume.modes();
        let volume = resume.volume();

        Self {
            transport,
            resume,
            catalog: Arc::new(Catalog::default()),
            state: PlaybackState {
                modes,
                volume,
                ..PlaybackState::default()
            },
            now_playing: None,
            active_line: 0,
            generation: 0,
            last_checkpoint_ms: 0,
            checkpoint_interval_ms: music.resume_checkpoint_secs.saturating_mul(1000),
            default_cover: music.default_cover.clone(),
            rng: StdRng::from_entropy(),
            resolve_tx,
            event_tx,
        }
    }

    /// Replace the shuffle random source, e.g. with a seeded one
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub const fn status(&self) -> PlayerStatus {
        self.state.status
    }

    /// Title, cover and lyrics of the current song
    #[must_use]
    pub const fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    /// Index of the highlighted line in [`NowPlaying::lyrics`]
    #[must_use]
    pub const fn active_line(&self) -> usize {
        self.active_line
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn resume(&self) -> &ResumeStore {
        &self.resume
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Generation of the most recent metadata request
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Adopt `catalog` and restore the saved playlist, song and position.
    ///
    /// A saved song that is no longer in its playlist falls back to the first
    /// song at position 0, and the corrected record is written back.
    pub fn load(&mut self, catalog: Arc<Catalog>) {
        if self.state.now_playing.is_some() {
            self.state.position_ms = self.transport.position_ms();
            self.checkpoint();
        }
        if self.state.status == PlayerStatus::Playing {
            self.transport.pause();
        }

        self.catalog = catalog;
        self.emit(SessionEvent::LibraryLoaded {
            playlists: self.catalog.playlist_names().into_iter().map(String::from).collect(),
            songs: self.catalog.len(),
        });

        self.state.modes = self.resume.modes();
        self.state.volume = self.resume.volume();
        self.state.mute = false;
        self.transport.set_volume(self.state.volume);

        if self.catalog.is_empty() {
            info!(target: LOG_TARGET, "Library is empty");
            self.state.now_playing = None;
            self.state.current_index = 0;
            self.state.position_ms = 0;
            self.now_playing = None;
            self.active_line = 0;
            self.set_status(PlayerStatus::Idle);
            return;
        }

        let mut playlist = self.resume.current_playlist().to_string();
        if !self.catalog.has_songs(&playlist) {
            warn!(
                target: LOG_TARGET,
                "Saved playlist {:?} no longer exists, showing {}", playlist, ALL_SONGS_PLAYLIST
            );
            playlist = ALL_SONGS_PLAYLIST.to_string();
            self.resume.set_current_playlist(&playlist);
        }

        self.resume.ensure_playlists(self.catalog.playlist_names());

        let catalog = Arc::clone(&self.catalog);
        let Some(songs) = catalog.songs(&playlist).filter(|s| !s.is_empty()) else {
            return;
        };

        let (index, position_ms) = match self.resume.load(&playlist) {
            Some((path, position_ms)) => match catalog.position_of(&playlist, &path) {
                Some(index) => (index, position_ms),
                None => {
                    info!(
                        target: LOG_TARGET,
                        "Saved song {:?} is gone from {}, starting from the top", path, playlist
                    );
                    self.resume.save(&playlist, &songs[0].path, 0);
                    (0, 0)
                }
            },
            None => (0, 0),
        };

        let song = songs[index].clone();
        self.state.displayed_playlist.clone_from(&playlist);
        self.state.playback_playlist = playlist;
        self.state.current_index = index;
        self.state.now_playing = Some(song.clone());

        self.transport.set_source(&song.path);
        if position_ms > 0 {
            self.transport.seek(position_ms);
        }
        self.state.position_ms = position_ms;
        self.last_checkpoint_ms = position_ms;

        info!(
            target: LOG_TARGET,
            "Restored {} at {}ms in {}", song.display_name, position_ms, self.state.playback_playlist
        );

        self.emit(SessionEvent::PlaylistShown {
            name: self.state.displayed_playlist.clone(),
            index,
        });
        self.show_placeholder(&song);
        self.emit(SessionEvent::SongChanged { song, index });
        self.set_status(PlayerStatus::Stopped);
        self.request_metadata(false);
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded.
    pub fn play(&mut self) -> Result<()> {
        match self.state.status {
            PlayerStatus::Idle => Err(CoreError::invalid("nothing to play")),
            PlayerStatus::Playing => Ok(()),
            PlayerStatus::Stopped | PlayerStatus::Paused => {
                self.transport.play();
                self.set_status(PlayerStatus::Playing);
                Ok(())
            }
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded.
    pub fn pause(&mut self) -> Result<()> {
        match self.state.status {
            PlayerStatus::Idle => Err(CoreError::invalid("nothing to pause")),
            PlayerStatus::Playing => {
                self.transport.pause();
                self.state.position_ms = self.transport.position_ms();
                self.checkpoint();
                self.set_status(PlayerStatus::Paused);
                Ok(())
            }
            PlayerStatus::Stopped | PlayerStatus::Paused => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded.
    pub fn toggle_play_pause(&mut self) -> Result<()> {
        if self.state.status == PlayerStatus::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` when the displayed playlist is empty.
    pub fn next(&mut self) -> Result<()> {
        let index = self.pick_index(true)?;
        self.set_new_song(index)
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` when the displayed playlist is empty.
    pub fn previous(&mut self) -> Result<()> {
        let index = self.pick_index(false)?;
        self.set_new_song(index)
    }

    /// Jump to `song` within the displayed playlist.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when the song is not in that playlist.
    pub fn select(&mut self, song: &Song) -> Result<()> {
        let index = self
            .catalog
            .position_of(&self.state.displayed_playlist, &song.path)
            .ok_or_else(|| {
                CoreError::invalid(format!(
                    "{:?} is not in playlist {}",
                    song.path, self.state.displayed_playlist
                ))
            })?;
        self.set_new_song(index)
    }

    /// Jump to position `index` of the displayed playlist.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when `index` is out of range.
    pub fn select_index(&mut self, index: usize) -> Result<()> {
        self.set_new_song(index)
    }

    /// Browse another playlist without interrupting playback.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for a missing or empty playlist; nothing
    /// changes in that case.
    pub fn show_playlist(&mut self, name: &str) -> Result<()> {
        if name == self.state.displayed_playlist {
            return Ok(());
        }

        let catalog = Arc::clone(&self.catalog);
        let songs = catalog
            .songs(name)
            .filter(|songs| !songs.is_empty())
            .ok_or_else(|| CoreError::invalid(format!("playlist {name:?} is missing or empty")))?;

        if self.state.now_playing.is_some() {
            self.state.position_ms = self.transport.position_ms();
            self.checkpoint();
        }

        let playing_at = self
            .state
            .now_playing
            .as_ref()
            .and_then(|current| songs.iter().position(|s| s.path == current.path));
        let index = playing_at.unwrap_or(0);

        debug!(target: LOG_TARGET, "Showing playlist {} at {}", name, index);
        self.state.displayed_playlist = name.to_string();
        self.state.current_index = index;
        self.resume.set_current_playlist(name);

        // Checkpoints of the playing song land in the record restored on load.
        if playing_at.is_some() {
            self.state.playback_playlist = name.to_string();
            self.checkpoint();
        }

        self.emit(SessionEvent::PlaylistShown {
            name: name.to_string(),
            index,
        });
        Ok(())
    }

    /// Apply a volume in `[0, 1]`, rounded to two decimals. Returns the applied value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for NaN.
    pub fn set_volume(&mut self, volume: f32) -> Result<f32> {
        if volume.is_nan() {
            return Err(CoreError::invalid("volume is not a number"));
        }
        let volume = (volume.clamp(0.0, 1.0) * 100.0).round() / 100.0;

        self.state.volume = volume;
        self.state.mute = false;
        self.transport.set_volume(volume);
        self.resume.set_volume(volume);

        self.emit(SessionEvent::VolumeChanged {
            volume,
            muted: false,
        });
        Ok(volume)
    }

    /// Toggle mute. Unmuting restores the persisted volume.
    pub fn toggle_mute(&mut self) -> bool {
        self.state.mute = !self.state.mute;
        let volume = self.resume.volume();
        self.state.volume = volume;
        self.transport
            .set_volume(if self.state.mute { 0.0 } else { volume });

        self.emit(SessionEvent::VolumeChanged {
            volume,
            muted: self.state.mute,
        });
        self.state.mute
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.state.modes.shuffle = !self.state.modes.shuffle;
        self.modes_changed();
        self.state.modes.shuffle
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.state.modes.repeat = !self.state.modes.repeat;
        self.modes_changed();
        self.state.modes.repeat
    }

    pub fn toggle_single_repeat(&mut self) -> bool {
        self.state.modes.single_repeat = !self.state.modes.single_repeat;
        self.modes_changed();
        self.state.modes.single_repeat
    }

    /// Seek within the current song, clamped to its duration when known.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded.
    pub fn seek(&mut self, position_ms: u64) -> Result<u64> {
        if self.state.now_playing.is_none() {
            return Err(CoreError::invalid("nothing to seek in"));
        }
        let position_ms = match self.transport.duration_ms() {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        };

        self.transport.seek(position_ms);
        self.update_position(position_ms);
        Ok(position_ms)
    }

    /// Seek to a fraction of the song's duration, as set on a progress bar.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded, the duration is
    /// not yet known, or `fraction` is NaN.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn seek_fraction(&mut self, fraction: f64) -> Result<u64> {
        if fraction.is_nan() {
            return Err(CoreError::invalid("seek fraction is not a number"));
        }
        let duration = self
            .transport
            .duration_ms()
            .filter(|d| *d > 0)
            .ok_or_else(|| CoreError::invalid("duration not known yet"))?;

        let position_ms = (fraction.clamp(0.0, 1.0) * duration as f64) as u64;
        self.seek(position_ms)
    }

    /// Re-resolve the current song using the next search candidate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when no song is loaded.
    pub fn refresh_metadata(&mut self) -> Result<u64> {
        if self.state.now_playing.is_none() {
            return Err(CoreError::invalid("no current song to refresh"));
        }
        Ok(self.request_metadata(true))
    }

    /// Apply a metadata result if it still belongs to the current song.
    ///
    /// Returns `false` for stale results, which are dropped.
    pub fn apply_metadata(&mut self, resolved: ResolvedMetadata) -> bool {
        let current = self.state.now_playing.as_ref().map(|s| s.path.as_path());
        if resolved.generation != self.generation || current != Some(resolved.path.as_path()) {
            debug!(
                target: LOG_TARGET,
                "Dropping stale metadata for {:?} (generation {}, current {})",
                resolved.path,
                resolved.generation,
                self.generation
            );
            return false;
        }

        let Some(song) = self.state.now_playing.clone() else {
            return false;
        };
        let metadata = resolved.resolution.metadata;
        let view = NowPlaying {
            song,
            cover: metadata.cover_or(&self.default_cover).to_string(),
            lyrics: metadata.display_lyrics(),
            title: metadata.title,
            artist: metadata.artist,
            album: metadata.album,
            origin: resolved.resolution.origin,
        };

        info!(target: LOG_TARGET, "Now playing: {} - {}", view.artist, view.title);
        self.active_line = view.lyrics.active_line(self.state.position_ms);
        self.now_playing = Some(view.clone());
        self.emit(SessionEvent::NowPlayingUpdated {
            now_playing: Box::new(view),
        });
        self.emit(SessionEvent::LyricLineChanged {
            index: self.active_line,
        });
        true
    }

    /// Handle a transport callback; events for a previous source are ignored.
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        let current = self.state.now_playing.as_ref().map(|s| s.path.as_path());
        if current != Some(event.source()) {
            debug!(target: LOG_TARGET, "Ignoring event for old source {:?}", event.source());
            return;
        }

        match event {
            TransportEvent::PositionChanged { position_ms, .. } => {
                self.update_position(position_ms);
                if position_ms.abs_diff(self.last_checkpoint_ms) >= self.checkpoint_interval_ms {
                    self.checkpoint();
                }
            }
            TransportEvent::Completed { .. } => self.on_transport_completed(),
        }
    }

    /// End of track: replay for single-repeat, advance when repeat is off,
    /// otherwise stay on the same song without restarting.
    pub fn on_transport_completed(&mut self) {
        self.reset_progress();

        if self.state.modes.single_repeat {
            debug!(target: LOG_TARGET, "Single repeat, restarting");
            self.transport.seek(0);
            self.transport.play();
            self.set_status(PlayerStatus::Playing);
        } else if !self.state.modes.repeat {
            if let Err(e) = self.next() {
                warn!(target: LOG_TARGET, "Cannot advance after completion: {}", e);
                self.set_status(PlayerStatus::Stopped);
            }
        } else {
            self.set_status(PlayerStatus::Stopped);
        }
    }

    fn set_new_song(&mut self, index: usize) -> Result<()> {
        let song = self
            .catalog
            .songs(&self.state.displayed_playlist)
            .and_then(|songs| songs.get(index))
            .cloned()
            .ok_or_else(|| {
                CoreError::invalid(format!(
                    "no song at index {index} in {}",
                    self.state.displayed_playlist
                ))
            })?;

        if self.state.status == PlayerStatus::Playing {
            self.transport.pause();
            self.set_status(PlayerStatus::Paused);
        }

        self.reset_progress();
        self.transport.set_source(&song.path);

        self.state.current_index = index;
        self.state.now_playing = Some(song.clone());
        self.state
            .playback_playlist
            .clone_from(&self.state.displayed_playlist);
        self.checkpoint();

        info!(target: LOG_TARGET, "Song changed: {} ({})", song.display_name, index);
        self.show_placeholder(&song);
        self.emit(SessionEvent::SongChanged { song, index });
        self.request_metadata(false);

        self.transport.play();
        self.set_status(PlayerStatus::Playing);
        Ok(())
    }

    fn pick_index(&mut self, forward: bool) -> Result<usize> {
        let len = self
            .catalog
            .songs(&self.state.displayed_playlist)
            .map_or(0, <[Song]>::len);
        if len == 0 {
            return Err(CoreError::invalid("displayed playlist is empty"));
        }
        let current = self.state.current_index.min(len - 1);

        if self.state.modes.shuffle {
            if len == 1 {
                return Ok(current);
            }
            loop {
                let candidate = self.rng.gen_range(0..len);
                if candidate != current {
                    return Ok(candidate);
                }
            }
        }

        Ok(if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        })
    }

    fn request_metadata(&mut self, force_next_candidate: bool) -> u64 {
        let Some(song) = self.state.now_playing.clone() else {
            return self.generation;
        };
        self.generation += 1;

        self.emit(SessionEvent::MetadataRequested {
            path: song.path.clone(),
        });
        let request = ResolveRequest {
            generation: self.generation,
            song,
            force_next_candidate,
        };
        if self.resolve_tx.send(request).is_err() {
            debug!(target: LOG_TARGET, "Metadata fetcher is gone, request dropped");
        }
        self.generation
    }

    fn show_placeholder(&mut self, song: &Song) {
        let view = NowPlaying {
            song: song.clone(),
            title: song.display_name.clone(),
            artist: String::new(),
            album: String::new(),
            cover: self.default_cover.clone(),
            lyrics: DisplayLyrics::not_found(),
            origin: MetadataOrigin::Placeholder,
        };
        self.active_line = 0;
        self.now_playing = Some(view.clone());
        self.emit(SessionEvent::NowPlayingUpdated {
            now_playing: Box::new(view),
        });
    }

    fn update_position(&mut self, position_ms: u64) {
        self.state.position_ms = position_ms;
        self.emit(SessionEvent::PositionChanged { position_ms });

        if let Some(view) = &self.now_playing {
            let line = view.lyrics.active_line(position_ms);
            if line != self.active_line {
                self.active_line = line;
                self.emit(SessionEvent::LyricLineChanged { index: line });
            }
        }
    }

    fn reset_progress(&mut self) {
        self.state.position_ms = 0;
        self.active_line = 0;
        self.emit(SessionEvent::ProgressReset);
    }

    /// Save the resume point of the current song under its playlist
    fn checkpoint(&mut self) {
        if let Some(song) = &self.state.now_playing {
            self.resume.save(
                &self.state.playback_playlist,
                &song.path,
                self.state.position_ms,
            );
            self.last_checkpoint_ms = self.state.position_ms;
        }
    }

    fn modes_changed(&mut self) {
        self.resume.set_modes(self.state.modes);
        self.emit(SessionEvent::ModesChanged {
            modes: self.state.modes,
        });
    }

    fn set_status(&mut self, status: PlayerStatus) {
        if self.state.status != status {
            self.state.status = status;
            self.emit(SessionEvent::StatusChanged { status });
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
