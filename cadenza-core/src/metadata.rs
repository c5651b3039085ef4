//! Two-tier metadata resolution: embedded tags first, remote lookup on miss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::MusicConfig;
use crate::error::{CoreError, Result};
use crate::library::Song;
use crate::lrc::DisplayLyrics;
use crate::provider::MetadataProvider;
use crate::tags::{EmbeddedTags, SourceRef, TagStore};

const LOG_TARGET: &str = "cadenza::metadata";

/// Resolved details of a song
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub title: String,
    /// Artist credits joined by `", "`
    pub artist: String,
    pub album: String,
    /// Accepted search result, `None` until a remote lookup succeeded
    pub source_ref: Option<SourceRef>,
    pub cover_url: Option<String>,
    /// Raw timestamped lyrics
    pub lyrics: Option<String>,
}

impl Metadata {
    /// What is shown before, or instead of, resolved metadata
    #[must_use]
    pub fn placeholder(song: &Song) -> Self {
        Self {
            title: song.display_name.clone(),
            ..Self::default()
        }
    }

    /// Cover URL, or `fallback` when there is none
    #[must_use]
    pub fn cover_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.cover_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
    }

    #[must_use]
    pub fn display_lyrics(&self) -> DisplayLyrics {
        DisplayLyrics::from_raw(self.lyrics.as_deref())
    }
}

/// Where a [`Resolution`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOrigin {
    /// Complete embedded tags, no network call made
    EmbeddedTags,
    /// Fetched remotely and written back to the file
    Remote,
    /// Fetched remotely but the tag write failed
    RemoteUnsaved,
    /// Resolution failed; display name only
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub metadata: Metadata,
    pub origin: MetadataOrigin,
}

/// Resolves metadata for songs, using the file's own tags as the cache.
///
/// At most one resolution per song runs at a time, so two concurrent
/// requests for the same file never race each other's tag write.
pub struct MetadataStore {
    tags: Arc<dyn TagStore>,
    provider: Arc<dyn MetadataProvider>,
    save_lyrics_sidecar: bool,
    in_flight: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl MetadataStore {
    #[must_use]
    pub fn new(
        tags: Arc<dyn TagStore>,
        provider: Arc<dyn MetadataProvider>,
        music: &MusicConfig,
    ) -> Self {
        Self {
            tags,
            provider,
            save_lyrics_sidecar: music.save_lyrics_sidecar,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve metadata for `song`, degrading to a placeholder on failure.
    ///
    /// With `force_next_candidate` the embedded tags are ignored and the
    /// search result after the previously accepted one is used, wrapping to
    /// the first result past the end.
    pub async fn resolve(&self, song: &Song, force_next_candidate: bool) -> Resolution {
        match self.try_resolve(song, force_next_candidate).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(target: LOG_TARGET, "Falling back to placeholder for {:?}: {}", song.path, e);
                Resolution {
                    metadata: Metadata::placeholder(song),
                    origin: MetadataOrigin::Placeholder,
                }
            }
        }
    }

    /// Fallible form of [`Self::resolve`].
    ///
    /// A failed tag write is not an error: the fetched metadata is returned
    /// with [`MetadataOrigin::RemoteUnsaved`].
    ///
    /// # Errors
    ///
    /// Returns `SongNotFound` for a missing file, `TagRead` for an unreadable
    /// tag, and the provider's error when the search fails or is empty.
    pub async fn try_resolve(&self, song: &Song, force_next_candidate: bool) -> Result<Resolution> {
        if !tokio::fs::try_exists(&song.path).await.unwrap_or(false) {
            return Err(CoreError::SongNotFound {
                path: song.path.clone(),
            });
        }

        let lock = self.song_lock(&song.path);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(song, force_next_candidate).await
        };
        drop(lock);
        self.release_song_lock(&song.path);

        result
    }

    async fn resolve_locked(&self, song: &Song, force_next_candidate: bool) -> Result<Resolution> {
        // Read after taking the lock: a resolution that just finished may
        // have completed the tags.
        let tags = self.read_tags(&song.path).await?;

        let recorded_index = tags.source_ref.as_ref().map(|r| r.index);

        if !force_next_candidate {
            if let Some(metadata) = tags.into_metadata() {
                debug!(target: LOG_TARGET, "Using embedded tags for {:?}", song.path);
                return Ok(Resolution {
                    metadata,
                    origin: MetadataOrigin::EmbeddedTags,
                });
            }
        }

        let wanted_index = match recorded_index {
            Some(index) if force_next_candidate => index.saturating_add(1),
            Some(index) => index,
            None => 0,
        };

        let keyword = song.display_name.as_str();
        info!(
            target: LOG_TARGET,
            "Searching {} for {:?} (candidate {})",
            self.provider.name(),
            keyword,
            wanted_index
        );

        let candidates = self.provider.search(keyword).await?;
        if candidates.is_empty() {
            return Err(CoreError::NoSearchResults {
                query: keyword.to_string(),
            });
        }

        let index = if wanted_index < candidates.len() {
            wanted_index
        } else {
            0
        };
        let candidate = &candidates[index];
        info!(
            target: LOG_TARGET,
            "Accepted candidate {}/{}: {} - {}",
            index + 1,
            candidates.len(),
            candidate.artist_line(),
            candidate.name
        );

        let lyrics = match self.provider.lyrics(&candidate.remote_id).await {
            Ok(lyrics) => lyrics.filter(|l| !l.trim().is_empty()),
            Err(e) => {
                warn!(target: LOG_TARGET, "Lyrics fetch failed for {}: {}", candidate.remote_id, e);
                None
            }
        };

        let metadata = Metadata {
            title: candidate.name.clone(),
            artist: candidate.artist_line(),
            album: candidate.album.clone(),
            source_ref: Some(SourceRef::new(index, candidate.remote_id.clone())),
            cover_url: candidate.cover_url.clone().filter(|s| !s.is_empty()),
            lyrics,
        };

        if self.save_lyrics_sidecar {
            if let Some(lyrics) = &metadata.lyrics {
                write_sidecar(&song.path, lyrics).await;
            }
        }

        let origin = match self.write_tags(&song.path, &metadata).await {
            Ok(()) => MetadataOrigin::Remote,
            Err(e) => {
                warn!(target: LOG_TARGET, "Keeping unsaved metadata for {:?}: {}", song.path, e);
                MetadataOrigin::RemoteUnsaved
            }
        };

        Ok(Resolution { metadata, origin })
    }

    async fn read_tags(&self, path: &Path) -> Result<EmbeddedTags> {
        let tags = Arc::clone(&self.tags);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || tags.read(&owned))
            .await
            .map_err(|e| CoreError::TagRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
    }

    async fn write_tags(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        let tags = Arc::clone(&self.tags);
        let owned = path.to_path_buf();
        let metadata = metadata.clone();
        tokio::task::spawn_blocking(move || tags.write(&owned, &metadata))
            .await
            .map_err(|e| CoreError::TagWrite {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
    }

    fn song_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(path.to_path_buf()).or_default())
    }

    fn release_song_lock(&self, path: &Path) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference left: nobody is waiting on this song.
        if in_flight.get(path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            in_flight.remove(path);
        }
    }
}

async fn write_sidecar(song_path: &Path, lyrics: &str) {
    let sidecar = song_path.with_extension("lrc");
    match tokio::fs::write(&sidecar, lyrics).await {
        Ok(()) => debug!(target: LOG_TARGET, "Saved lyrics to {:?}", sidecar),
        Err(e) => warn!(target: LOG_TARGET, "Failed to save lyrics to {:?}: {}", sidecar, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{embedded, MemoryTagStore, ScriptedProvider};
    use std::sync::atomic::Ordering;

    struct Fixture {
        _dir: tempfile::TempDir,
        song: Song,
        tags: Arc<MemoryTagStore>,
        provider: Arc<ScriptedProvider>,
        store: MetadataStore,
    }

    fn fixture(tags: MemoryTagStore, provider: ScriptedProvider, sidecar: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("03.Sunny Day.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let tags = Arc::new(tags);
        let provider = Arc::new(provider);
        let music = MusicConfig {
            save_lyrics_sidecar: sidecar,
            ..MusicConfig::default()
        };
        let store = MetadataStore::new(
            Arc::clone(&tags) as Arc<dyn TagStore>,
            Arc::clone(&provider) as Arc<dyn MetadataProvider>,
            &music,
        );

        Fixture {
            _dir: dir,
            song: Song::from_path(path),
            tags,
            provider,
            store,
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_and_writes_back() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(3), false);

        let resolution = f.store.resolve(&f.song, false).await;

        assert_eq!(resolution.origin, MetadataOrigin::Remote);
        assert_eq!(resolution.metadata.title, "Title 0");
        assert_eq!(resolution.metadata.artist, "Singer, Feat 0");
        assert_eq!(resolution.metadata.source_ref, Some(SourceRef::new(0, "mid0")));
        assert_eq!(resolution.metadata.lyrics.as_deref(), Some("[00:01.00]mid0 line"));
        assert!(f.tags.get(&f.song.path).is_complete());
    }

    #[tokio::test]
    async fn test_second_resolve_is_idempotent_without_network() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(2), false);

        let first = f.store.resolve(&f.song, false).await;
        let second = f.store.resolve(&f.song, false).await;

        assert_eq!(f.provider.searches(), 1);
        assert_eq!(f.provider.lyric_fetches(), 1);
        assert_eq!(second.origin, MetadataOrigin::EmbeddedTags);
        assert_eq!(first.metadata, second.metadata);
    }

    #[tokio::test]
    async fn test_complete_tags_skip_network() {
        let tags = MemoryTagStore::default();
        let f = fixture(tags, ScriptedProvider::with_candidates(1), false);
        let cached = Metadata {
            title: "Cached".into(),
            artist: "Someone".into(),
            album: "Record".into(),
            source_ref: Some(SourceRef::new(4, "xyz")),
            cover_url: Some("https://img.example/c.jpg".into()),
            lyrics: Some("[00:00.00]hi".into()),
        };
        f.tags.put(&f.song.path, embedded(&cached));

        let resolution = f.store.resolve(&f.song, false).await;

        assert_eq!(resolution.metadata, cached);
        assert_eq!(f.provider.searches(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_tags_refetch_at_recorded_index() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(3), false);
        f.tags.put(
            &f.song.path,
            EmbeddedTags {
                title: Some("Partial".into()),
                source_ref: Some(SourceRef::new(2, "mid2")),
                ..EmbeddedTags::default()
            },
        );

        let resolution = f.store.resolve(&f.song, false).await;
        assert_eq!(resolution.metadata.source_ref, Some(SourceRef::new(2, "mid2")));
        assert_eq!(resolution.metadata.title, "Title 2");
    }

    #[tokio::test]
    async fn test_force_next_cycles_and_wraps() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(3), false);

        let picks: Vec<usize> = {
            let mut picks = Vec::new();
            picks.push(f.store.resolve(&f.song, false).await);
            for _ in 0..3 {
                picks.push(f.store.resolve(&f.song, true).await);
            }
            picks
                .into_iter()
                .map(|r| r.metadata.source_ref.unwrap().index)
                .collect()
        };

        assert_eq!(picks, vec![0, 1, 2, 0]);
        assert_eq!(f.provider.searches(), 4);
    }

    #[tokio::test]
    async fn test_force_without_recorded_index_starts_at_zero() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(2), false);
        let resolution = f.store.resolve(&f.song, true).await;
        assert_eq!(resolution.metadata.source_ref, Some(SourceRef::new(0, "mid0")));
    }

    #[tokio::test]
    async fn test_lyrics_failure_keeps_other_fields() {
        let provider = ScriptedProvider {
            fail_lyrics: true,
            ..ScriptedProvider::with_candidates(1)
        };
        let f = fixture(MemoryTagStore::default(), provider, false);

        let resolution = f.store.resolve(&f.song, false).await;
        assert_eq!(resolution.origin, MetadataOrigin::Remote);
        assert_eq!(resolution.metadata.title, "Title 0");
        assert_eq!(resolution.metadata.lyrics, None);
        assert!(!resolution.metadata.display_lyrics().is_found());
    }

    #[tokio::test]
    async fn test_tag_write_failure_returns_fetched_metadata() {
        let tags = MemoryTagStore {
            fail_writes: true,
            ..MemoryTagStore::default()
        };
        let f = fixture(tags, ScriptedProvider::with_candidates(1), false);

        let resolution = f.store.resolve(&f.song, false).await;
        assert_eq!(resolution.origin, MetadataOrigin::RemoteUnsaved);
        assert_eq!(resolution.metadata.title, "Title 0");
    }

    #[tokio::test]
    async fn test_network_failure_gives_placeholder() {
        let provider = ScriptedProvider {
            fail_search: true,
            ..ScriptedProvider::with_candidates(1)
        };
        let f = fixture(MemoryTagStore::default(), provider, false);

        let resolution = f.store.resolve(&f.song, false).await;
        assert_eq!(resolution.origin, MetadataOrigin::Placeholder);
        assert_eq!(resolution.metadata.title, "Sunny Day");
        assert_eq!(resolution.metadata.cover_or("default.jpg"), "default.jpg");
        assert!(resolution.metadata.artist.is_empty());
    }

    #[tokio::test]
    async fn test_empty_search_gives_placeholder() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::default(), false);

        let err = f.store.try_resolve(&f.song, false).await.unwrap_err();
        assert!(matches!(err, CoreError::NoSearchResults { .. }));
        assert_eq!(
            f.store.resolve(&f.song, false).await.origin,
            MetadataOrigin::Placeholder
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(1), false);
        let ghost = Song::from_path(f.song.path.with_file_name("ghost.mp3"));

        let err = f.store.try_resolve(&ghost, false).await.unwrap_err();
        assert!(matches!(err, CoreError::SongNotFound { .. }));
        assert_eq!(f.provider.searches(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_fetches_once() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(2), false);

        let (a, b) = tokio::join!(f.store.resolve(&f.song, false), f.store.resolve(&f.song, false));

        assert_eq!(f.provider.searches(), 1);
        assert_eq!(f.tags.writes.load(Ordering::SeqCst), 1);
        assert_eq!(a.metadata, b.metadata);
        assert!(f.store.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lyrics_sidecar_written() {
        let f = fixture(MemoryTagStore::default(), ScriptedProvider::with_candidates(1), true);

        f.store.resolve(&f.song, false).await;

        let sidecar = f.song.path.with_extension("lrc");
        assert_eq!(
            std::fs::read_to_string(sidecar).unwrap(),
            "[00:01.00]mid0 line"
        );
    }
}
