//! In-memory stand-ins for the tag container and the remote provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CoreError, Result};
use crate::metadata::Metadata;
use crate::provider::{MetadataProvider, SearchCandidate};
use crate::tags::{EmbeddedTags, TagStore};

#[derive(Default)]
pub struct MemoryTagStore {
    pub files: Mutex<HashMap<PathBuf, EmbeddedTags>>,
    pub fail_writes: bool,
    pub writes: AtomicUsize,
}

impl MemoryTagStore {
    pub fn get(&self, path: &Path) -> EmbeddedTags {
        self.files.lock().unwrap().get(path).cloned().unwrap_or_default()
    }

    pub fn put(&self, path: &Path, tags: EmbeddedTags) {
        self.files.lock().unwrap().insert(path.to_path_buf(), tags);
    }
}

impl TagStore for MemoryTagStore {
    fn read(&self, path: &Path) -> Result<EmbeddedTags> {
        Ok(self.get(path))
    }

    fn write(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        if self.fail_writes {
            return Err(CoreError::TagWrite {
                path: path.to_path_buf(),
                reason: "read-only".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put(path, embedded(metadata));
        Ok(())
    }
}

/// Tags as [`crate::tags::Id3TagStore`] would store `metadata`
pub fn embedded(metadata: &Metadata) -> EmbeddedTags {
    let some = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
    EmbeddedTags {
        title: some(&metadata.title),
        artist: some(&metadata.artist),
        album: some(&metadata.album),
        source_ref: metadata.source_ref.clone(),
        cover_url: metadata.cover_url.clone(),
        lyrics: metadata.lyrics.clone(),
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    pub candidates: Vec<SearchCandidate>,
    pub fail_search: bool,
    pub fail_lyrics: bool,
    pub searches: AtomicUsize,
    pub lyric_fetches: AtomicUsize,
}

impl ScriptedProvider {
    /// `count` candidates `mid0..`, each with two artists and a cover
    pub fn with_candidates(count: usize) -> Self {
        let candidates = (0..count)
            .map(|i| {
                SearchCandidate::new(format!("mid{i}"), format!("Title {i}"))
                    .with_artist("Singer")
                    .with_artist(format!("Feat {i}"))
                    .with_album(format!("Album {i}"))
                    .with_cover_url(format!("https://img.example/{i}.jpg"))
            })
            .collect();
        Self {
            candidates,
            ..Self::default()
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn lyric_fetches(&self) -> usize {
        self.lyric_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(&self, _keyword: &str) -> Result<Vec<SearchCandidate>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_search {
            return Err(CoreError::ProviderFailed {
                provider: "scripted".to_string(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(self.candidates.clone())
    }

    async fn lyrics(&self, remote_id: &str) -> Result<Option<String>> {
        self.lyric_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_lyrics {
            return Err(CoreError::ProviderFailed {
                provider: "scripted".to_string(),
                reason: "timeout".to_string(),
            });
        }
        Ok(Some(format!("[00:01.00]{remote_id} line")))
    }
}
