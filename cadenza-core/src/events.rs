use std::path::PathBuf;

use crate::library::Song;
use crate::lrc::DisplayLyrics;
use crate::metadata::MetadataOrigin;
use crate::resume::PlaybackModes;
use crate::session::PlayerStatus;

/// What the UI shows for the current song
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub song: Song,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Cover URL, or the configured default cover
    pub cover: String,
    pub lyrics: DisplayLyrics,
    pub origin: MetadataOrigin,
}

/// Events emitted by the playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A catalog was loaded; `songs` is the size of the aggregate view
    LibraryLoaded { playlists: Vec<String>, songs: usize },
    /// A different song became current
    SongChanged { song: Song, index: usize },
    StatusChanged { status: PlayerStatus },
    /// The progress display went back to zero
    ProgressReset,
    /// Regular position update for the current song
    PositionChanged { position_ms: u64 },
    /// Index into [`NowPlaying::lyrics`] of the line to highlight
    LyricLineChanged { index: usize },
    /// Title, artist, cover or lyrics changed for the current song
    NowPlayingUpdated { now_playing: Box<NowPlaying> },
    /// The navigated playlist changed
    PlaylistShown { name: String, index: usize },
    VolumeChanged { volume: f32, muted: bool },
    ModesChanged { modes: PlaybackModes },
    /// Metadata was requested for this song
    MetadataRequested { path: PathBuf },
}
