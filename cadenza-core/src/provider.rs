use crate::error::CoreError;
use async_trait::async_trait;

/// One ranked result of a remote metadata search
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchCandidate {
    /// Track identifier on the remote service
    pub remote_id: String,
    /// Track name
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
    /// Album name
    pub album: String,
    /// Cover image URL, when the service has one
    pub cover_url: Option<String>,
}

impl SearchCandidate {
    /// Create a candidate with the required fields
    #[must_use]
    pub fn new(remote_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add an artist credit
    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }

    /// Set album name
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    /// Set cover URL
    #[must_use]
    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    /// Artists joined the way they are stored in tags
    #[must_use]
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Trait for remote metadata services
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Search for tracks matching a free-text keyword, best match first
    async fn search(&self, keyword: &str) -> Result<Vec<SearchCandidate>, CoreError>;

    /// Fetch raw timestamped lyrics for a track; `None` when there are none
    async fn lyrics(&self, remote_id: &str) -> Result<Option<String>, CoreError>;
}
