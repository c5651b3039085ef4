pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod library;
pub mod lrc;
pub mod metadata;
pub mod paths;
pub mod player;
pub mod provider;
pub mod resume;
pub mod session;
pub mod tags;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    CadenzaConfig, LoggingConfig, MusicConfig, ProviderConfig, ThemeConfig, ThemeMode,
    WindowConfig,
};
pub use error::CoreError;
pub use events::{NowPlaying, SessionEvent};
pub use fetcher::MetadataFetcher;
pub use library::{
    Catalog, LibraryIndex, Playlist, Song, ALL_SONGS_FOLDER_PLAYLIST, ALL_SONGS_PLAYLIST,
    DEFAULT_PLAYLIST,
};
pub use lrc::{DisplayLyrics, LyricsLine, LYRICS_NOT_FOUND, LYRICS_PADDING_LINES};
pub use metadata::{Metadata, MetadataOrigin, MetadataStore, Resolution};
pub use paths::{
    config_dir, config_path, log_file_path, settings_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LOG_FILE_NAME, SETTINGS_FILE_NAME,
};
pub use player::{Player, PlayerCommand, PlayerHandle};
pub use provider::{MetadataProvider, SearchCandidate};
pub use resume::{PlaybackModes, PlaylistState, ResumeStore, Settings};
pub use session::{PlaybackSession, PlaybackState, PlayerStatus, ResolveRequest, ResolvedMetadata};
pub use tags::{EmbeddedTags, Id3TagStore, SourceRef, TagStore};
pub use transport::{NullTransport, Transport, TransportEvent};
