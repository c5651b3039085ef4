//! Library scanning and the playlist catalog.
//!
//! Every directory under the music root that directly holds audio files
//! becomes a playlist named after the directory. Files sitting in the root
//! itself land in [`DEFAULT_PLAYLIST`], and [`ALL_SONGS_PLAYLIST`] is the
//! aggregate view over every song.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

const LOG_TARGET: &str = "cadenza::library";

/// Name of the aggregate view over all discovered songs
pub const ALL_SONGS_PLAYLIST: &str = "All Songs";

/// Playlist name for audio files placed directly in the music root
pub const DEFAULT_PLAYLIST: &str = "Default";

/// Name given to a directory that is itself called [`ALL_SONGS_PLAYLIST`]
pub const ALL_SONGS_FOLDER_PLAYLIST: &str = "All Songs (folder)";

/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3"];

/// A discovered audio file. The absolute path is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Song {
    pub path: PathBuf,
    /// File name without extension or numeric `NN.` prefix
    pub display_name: String,
}

impl Song {
    #[must_use]
    pub fn from_path(path: PathBuf) -> Self {
        let display_name = display_name(&file_name(&path));
        Self { path, display_name }
    }

    /// Case-insensitive file name, then full path to break ties
    fn sort_key(&self) -> (String, &Path) {
        (file_name(&self.path).to_lowercase(), self.path.as_path())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Format a file name for display: `"04.Song Title.mp3"` becomes `"Song Title"`.
#[must_use]
pub fn display_name(file_name: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);

    match stem.split_once('.') {
        Some((prefix, rest))
            if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest.trim().to_string()
        }
        _ => stem.trim().to_string(),
    }
}

fn sort_songs(songs: &mut [Song]) {
    songs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// A named, ordered list of songs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub songs: Vec<Song>,
}

/// Read-only snapshot of the scanned library
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    playlists: Vec<Playlist>,
    all_songs: Vec<Song>,
}

impl Catalog {
    /// Build a catalog from songs grouped by playlist name.
    ///
    /// Each playlist and the aggregate view are sorted by file name.
    #[must_use]
    pub fn from_groups(mut groups: BTreeMap<String, Vec<Song>>) -> Self {
        // The aggregate view owns its name.
        if let Some(songs) = groups.remove(ALL_SONGS_PLAYLIST) {
            warn!(
                target: LOG_TARGET,
                "Directory {:?} listed as {:?}", ALL_SONGS_PLAYLIST, ALL_SONGS_FOLDER_PLAYLIST
            );
            groups
                .entry(ALL_SONGS_FOLDER_PLAYLIST.to_string())
                .or_default()
                .extend(songs);
        }

        let mut all_songs = Vec::new();
        let mut playlists = Vec::with_capacity(groups.len());

        for (name, mut songs) in groups {
            if songs.is_empty() {
                continue;
            }
            sort_songs(&mut songs);
            all_songs.extend(songs.iter().cloned());
            playlists.push(Playlist { name, songs });
        }

        // Global filename order, independent of which playlist a song came from.
        sort_songs(&mut all_songs);

        Self {
            playlists,
            all_songs,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_songs.is_empty()
    }

    /// Number of distinct songs
    #[must_use]
    pub fn len(&self) -> usize {
        self.all_songs.len()
    }

    /// Concrete playlists in name order
    #[must_use]
    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    #[must_use]
    pub fn all_songs(&self) -> &[Song] {
        &self.all_songs
    }

    /// Songs of a concrete playlist or of the aggregate view
    #[must_use]
    pub fn songs(&self, playlist: &str) -> Option<&[Song]> {
        if playlist == ALL_SONGS_PLAYLIST {
            return Some(&self.all_songs);
        }
        self.playlists
            .iter()
            .find(|p| p.name == playlist)
            .map(|p| p.songs.as_slice())
    }

    /// Whether `playlist` names a view with at least one song
    #[must_use]
    pub fn has_songs(&self, playlist: &str) -> bool {
        self.songs(playlist).is_some_and(|songs| !songs.is_empty())
    }

    /// The aggregate view first, then concrete playlists in name order
    #[must_use]
    pub fn playlist_names(&self) -> Vec<&str> {
        std::iter::once(ALL_SONGS_PLAYLIST)
            .chain(self.playlists.iter().map(|p| p.name.as_str()))
            .collect()
    }

    /// Index of the song at `path` within `playlist`
    #[must_use]
    pub fn position_of(&self, playlist: &str, path: &Path) -> Option<usize> {
        self.songs(playlist)?.iter().position(|s| s.path == path)
    }
}

/// Scan `root`, degrading to an empty catalog on any failure.
#[must_use]
pub fn scan(root: &Path) -> Catalog {
    match try_scan(root) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(target: LOG_TARGET, "Library scan failed, using empty library: {}", e);
            Catalog::default()
        }
    }
}

/// Scan `root` into a catalog, creating the directory when it does not exist.
///
/// # Errors
///
/// Returns `LibraryUnavailable` when the root is not a directory, cannot be
/// created, or the walk fails for a reason other than a denied sub-directory.
pub fn try_scan(root: &Path) -> Result<Catalog> {
    let root = std::path::absolute(root)?;
    let unavailable = |reason: String| CoreError::LibraryUnavailable {
        path: root.clone(),
        reason,
    };

    if !root.exists() {
        std::fs::create_dir_all(&root)
            .map_err(|e| unavailable(format!("cannot create music directory: {e}")))?;
        info!(target: LOG_TARGET, "Created music directory {:?}", root);
        return Ok(Catalog::default());
    }

    if !root.is_dir() {
        return Err(unavailable("not a directory".to_string()));
    }

    info!(target: LOG_TARGET, "Scanning: {:?}", root);

    let mut groups: BTreeMap<String, Vec<Song>> = BTreeMap::new();

    for entry in WalkDir::new(&root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e)
                if e.io_error().map(std::io::Error::kind)
                    == Some(std::io::ErrorKind::PermissionDenied) =>
            {
                warn!(target: LOG_TARGET, "Access denied, skipping: {:?}", e.path());
                continue;
            }
            Err(e) => return Err(unavailable(e.to_string())),
        };

        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }

        let path = entry.into_path();
        let playlist = playlist_name(&root, &path);
        debug!(target: LOG_TARGET, "Found {:?} in playlist {}", path, playlist);
        groups.entry(playlist).or_default().push(Song::from_path(path));
    }

    let catalog = Catalog::from_groups(groups);
    info!(
        target: LOG_TARGET,
        "Found {} songs in {} playlists",
        catalog.len(),
        catalog.playlists().len()
    );
    Ok(catalog)
}

fn playlist_name(root: &Path, song: &Path) -> String {
    match song.parent() {
        Some(dir) if dir != root => dir
            .file_name()
            .map_or_else(|| DEFAULT_PLAYLIST.to_string(), |n| n.to_string_lossy().into_owned()),
        _ => DEFAULT_PLAYLIST.to_string(),
    }
}

/// Checks if a file has a supported audio extension.
fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

/// Owner of the current catalog.
///
/// Readers take an `Arc` snapshot; a rescan builds a complete new catalog
/// before swapping it in.
#[derive(Debug)]
pub struct LibraryIndex {
    root: PathBuf,
    catalog: RwLock<Arc<Catalog>>,
}

impl LibraryIndex {
    /// Scan `root` and hold the result
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let catalog = Arc::new(scan(&root));
        Self {
            root,
            catalog: RwLock::new(catalog),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current catalog snapshot
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rescan the root and replace the catalog
    pub fn rescan(&self) -> Arc<Catalog> {
        let fresh = Arc::new(scan(&self.root));
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        fresh
    }
}
