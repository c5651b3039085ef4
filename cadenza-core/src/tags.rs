//! Embedded tag container access.
//!
//! The tags inside each audio file double as the metadata cache. Six fields
//! are used: title (`TIT2`), artists (`TPE1`), album (`TALB`), the source
//! reference (`TSRC`, `"<index>:<remote_id>"`), a `COMM` frame described as
//! `CoverURL`, and the raw timestamped lyrics (`USLT`).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use id3::frame::{Comment, Lyrics};
use id3::{ErrorKind, Tag, TagLike, Version};

use crate::error::{CoreError, Result};
use crate::metadata::Metadata;

/// Description of the comment frame carrying the cover URL
pub const COVER_COMMENT_DESCRIPTION: &str = "CoverURL";

const LYRICS_DESCRIPTION: &str = "Lyrics";
const FRAME_LANG: &str = "eng";
const SOURCE_REF_FRAME: &str = "TSRC";

/// Which remote search result was chosen for a song.
///
/// Encoded as `"<index>:<remote_id>"` so a forced refresh knows where the
/// previous lookup left off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Position of the accepted candidate in the search results
    pub index: usize,
    /// Track identifier on the remote service
    pub remote_id: String,
}

impl SourceRef {
    #[must_use]
    pub fn new(index: usize, remote_id: impl Into<String>) -> Self {
        Self {
            index,
            remote_id: remote_id.into(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.remote_id)
    }
}

impl FromStr for SourceRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (index, remote_id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| CoreError::invalid(format!("source reference without ':' in {s:?}")))?;
        let index = index
            .parse()
            .map_err(|_| CoreError::invalid(format!("bad source reference index in {s:?}")))?;
        Ok(Self::new(index, remote_id))
    }
}

/// Fields as found in a file. Absent or blank fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub source_ref: Option<SourceRef>,
    pub cover_url: Option<String>,
    pub lyrics: Option<String>,
}

impl EmbeddedTags {
    /// All six fields present, so no remote lookup is needed
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.title.is_some()
            && self.artist.is_some()
            && self.album.is_some()
            && self.source_ref.is_some()
            && self.cover_url.is_some()
            && self.lyrics.is_some()
    }

    /// Convert a complete set of fields into resolved metadata
    #[must_use]
    pub fn into_metadata(self) -> Option<Metadata> {
        Some(Metadata {
            title: self.title?,
            artist: self.artist?,
            album: self.album?,
            source_ref: Some(self.source_ref?),
            cover_url: Some(self.cover_url?),
            lyrics: Some(self.lyrics?),
        })
    }
}

/// Read and write access to the tags embedded in audio files
pub trait TagStore: Send + Sync {
    /// Read the metadata fields; a file without a tag yields all-`None`.
    ///
    /// # Errors
    ///
    /// Returns `TagRead` when the file or its tag cannot be read.
    fn read(&self, path: &Path) -> Result<EmbeddedTags>;

    /// Write the metadata fields, keeping unrelated frames.
    ///
    /// # Errors
    ///
    /// Returns `TagWrite` when the tag cannot be written back.
    fn write(&self, path: &Path, metadata: &Metadata) -> Result<()>;
}

/// [`TagStore`] over ID3v2 tags
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3TagStore;

impl TagStore for Id3TagStore {
    fn read(&self, path: &Path) -> Result<EmbeddedTags> {
        let tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(e) if matches!(e.kind, ErrorKind::NoTag) => return Ok(EmbeddedTags::default()),
            Err(e) => {
                return Err(CoreError::TagRead {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        let tags = EmbeddedTags {
            title: non_blank(tag.title()),
            artist: non_blank(tag.artist()),
            album: non_blank(tag.album()),
            source_ref: text_frame(&tag, SOURCE_REF_FRAME).and_then(|s| s.parse().ok()),
            cover_url: non_blank(
                tag.comments()
                    .find(|c| c.description == COVER_COMMENT_DESCRIPTION)
                    .map(|c| c.text.as_str()),
            ),
            lyrics: non_blank(tag.lyrics().next().map(|l| l.text.as_str())),
        };
        Ok(tags)
    }

    fn write(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        let tag_write = |reason: String| CoreError::TagWrite {
            path: path.to_path_buf(),
            reason,
        };

        let mut tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(e) if matches!(e.kind, ErrorKind::NoTag) => Tag::new(),
            Err(e) => return Err(tag_write(e.to_string())),
        };

        tag.set_title(metadata.title.as_str());
        tag.set_artist(metadata.artist.as_str());
        tag.set_album(metadata.album.as_str());

        match &metadata.source_ref {
            Some(source_ref) => tag.set_text(SOURCE_REF_FRAME, source_ref.to_string()),
            None => {
                let _ = tag.remove(SOURCE_REF_FRAME);
            }
        }

        tag.remove_comment(Some(COVER_COMMENT_DESCRIPTION), None);
        if let Some(cover_url) = metadata.cover_url.as_deref().filter(|s| !s.is_empty()) {
            let _ = tag.add_frame(Comment {
                lang: FRAME_LANG.to_string(),
                description: COVER_COMMENT_DESCRIPTION.to_string(),
                text: cover_url.to_string(),
            });
        }

        tag.remove_all_lyrics();
        if let Some(lyrics) = metadata.lyrics.as_deref().filter(|s| !s.is_empty()) {
            let _ = tag.add_frame(Lyrics {
                lang: FRAME_LANG.to_string(),
                description: LYRICS_DESCRIPTION.to_string(),
                text: lyrics.to_string(),
            });
        }

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|e| tag_write(e.to_string()))
    }
}

fn text_frame<'a>(tag: &'a Tag, id: &str) -> Option<&'a str> {
    tag.get(id).and_then(|frame| frame.content().text())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
