use async_trait::async_trait;
use cadenza_core::{CoreError, MetadataProvider, ProviderConfig, SearchCandidate};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "cadenza::timeless";

const PROVIDER_NAME: &str = "timeless";

/// Connect timeout, independent of the configured request timeout
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Timeless music API provider (search + lyric endpoints)
pub struct TimelessProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl TimelessProvider {
    /// Create a provider from the `[provider]` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ProviderConfig) -> Result<Self, CoreError> {
        // Base client with timeout
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent("Cadenza/0.1 (https://github.com/cadenza-player/cadenza)")
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}/search?keyword={}",
            self.base_url,
            urlencoding::encode(keyword)
        )
    }

    fn lyric_url(&self, remote_id: &str) -> String {
        format!(
            "{}/lyric?songmid={}",
            self.base_url,
            urlencoding::encode(remote_id)
        )
    }

    fn failed(&self, reason: String) -> CoreError {
        CoreError::ProviderFailed {
            provider: self.name().to_string(),
            reason,
        }
    }
}

/// Envelope shared by both endpoints.
/// The API returns extra fields (code, msg, paging) that serde ignores.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    list: Vec<SearchItem>,
}

/// One search hit. The API sends `null` for fields it has no value for,
/// so every field is optional.
#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    songmid: Option<String>,
    #[serde(default)]
    songname: Option<String>,
    #[serde(default)]
    singer: Option<Vec<Singer>>,
    #[serde(default)]
    albumname: Option<String>,
    #[serde(default)]
    albumcover: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Singer {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LyricData {
    #[serde(default)]
    lyric: Option<String>,
}

impl SearchItem {
    /// Items without a song id cannot be fetched later and are dropped
    fn into_candidate(self) -> Option<SearchCandidate> {
        let songmid = self.songmid.filter(|mid| !mid.is_empty())?;
        let mut candidate = SearchCandidate::new(songmid, self.songname.unwrap_or_default())
            .with_album(self.albumname.unwrap_or_default());
        for name in self.singer.unwrap_or_default().into_iter().filter_map(|s| s.name) {
            candidate = candidate.with_artist(name);
        }
        match self.albumcover {
            Some(cover) if !cover.trim().is_empty() => Some(candidate.with_cover_url(cover)),
            _ => Some(candidate),
        }
    }
}

fn candidates_from(envelope: Envelope<SearchData>) -> Vec<SearchCandidate> {
    envelope
        .data
        .unwrap_or_default()
        .list
        .into_iter()
        .filter_map(SearchItem::into_candidate)
        .collect()
}

fn lyric_from(envelope: Envelope<LyricData>) -> Option<String> {
    envelope
        .data
        .and_then(|data| data.lyric)
        .filter(|lyric| !lyric.trim().is_empty())
}

#[async_trait]
impl MetadataProvider for TimelessProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SearchCandidate>, CoreError> {
        let url = self.search_url(keyword);
        info!(target: LOG_TARGET, "Timeless GET (search): {}", url);

        let response = self.client.get(&url).send().await?;
        debug!(target: LOG_TARGET, "Timeless response status: {}", response.status());

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "Timeless search returned status: {}", response.status());
            return Err(self.failed(format!("search returned status: {}", response.status())));
        }

        let envelope: Envelope<SearchData> = response.json().await?;
        let candidates = candidates_from(envelope);
        info!(
            target: LOG_TARGET,
            "Timeless search for {:?} returned {} candidate(s)",
            keyword,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn lyrics(&self, remote_id: &str) -> Result<Option<String>, CoreError> {
        let url = self.lyric_url(remote_id);
        info!(target: LOG_TARGET, "Timeless GET (lyric): {}", url);

        let response = self.client.get(&url).send().await?;
        debug!(target: LOG_TARGET, "Timeless response status: {}", response.status());

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "Timeless lyric returned status: {}", response.status());
            return Err(self.failed(format!("lyric returned status: {}", response.status())));
        }

        let envelope: Envelope<LyricData> = response.json().await?;
        let lyric = lyric_from(envelope);
        if lyric.is_none() {
            info!(target: LOG_TARGET, "Timeless has no lyrics for songmid {}", remote_id);
        }
        Ok(lyric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> TimelessProvider {
        TimelessProvider::new(&ProviderConfig {
            base_url: base_url.to_string(),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_urls_encode_query_and_trim_slash() {
        let provider = provider("https://api.example.com/music/");
        assert_eq!(
            provider.search_url("Sunny Day & Night"),
            "https://api.example.com/music/search?keyword=Sunny%20Day%20%26%20Night"
        );
        assert_eq!(
            provider.lyric_url("003a 1"),
            "https://api.example.com/music/lyric?songmid=003a%201"
        );
    }

    #[test]
    fn test_search_response_maps_to_candidates() {
        let body = r#"{
            "code": 200,
            "data": {
                "total": 2,
                "list": [
                    {
                        "songmid": "0039MnYb0qxYhV",
                        "songname": "Sunny Day",
                        "singer": [{"name": "Jay Chou", "mid": "x"}, {"name": "Guest"}],
                        "albumname": "Ye Hui Mei",
                        "albumcover": "https://img.example/cover.jpg"
                    },
                    {
                        "songmid": "002",
                        "songname": "Sunny Day (Live)",
                        "singer": [],
                        "albumname": "",
                        "albumcover": ""
                    }
                ]
            }
        }"#;
        let envelope: Envelope<SearchData> = serde_json::from_str(body).unwrap();
        let candidates = candidates_from(envelope);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].remote_id, "0039MnYb0qxYhV");
        assert_eq!(candidates[0].name, "Sunny Day");
        assert_eq!(candidates[0].artist_line(), "Jay Chou, Guest");
        assert_eq!(candidates[0].album, "Ye Hui Mei");
        assert_eq!(
            candidates[0].cover_url.as_deref(),
            Some("https://img.example/cover.jpg")
        );
        assert!(candidates[1].artists.is_empty());
        assert_eq!(candidates[1].cover_url, None);
    }

    #[test]
    fn test_search_without_data_is_empty() {
        let envelope: Envelope<SearchData> =
            serde_json::from_str(r#"{"code": 500, "msg": "busy"}"#).unwrap();
        assert!(candidates_from(envelope).is_empty());

        let envelope: Envelope<SearchData> =
            serde_json::from_str(r#"{"data": {"list": [{"songmid": ""}]}}"#).unwrap();
        assert!(candidates_from(envelope).is_empty());
    }

    #[test]
    fn test_search_tolerates_null_fields() {
        let body = r#"{
            "data": {
                "list": [
                    {"songmid": null, "songname": "No id"},
                    {"songname": "Missing id"},
                    {
                        "songmid": "ok1",
                        "songname": null,
                        "singer": [{"name": null}, {"name": "Solo"}],
                        "albumname": null,
                        "albumcover": null
                    },
                    {"songmid": "ok2", "singer": null}
                ]
            }
        }"#;
        let envelope: Envelope<SearchData> = serde_json::from_str(body).unwrap();
        let candidates = candidates_from(envelope);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].remote_id, "ok1");
        assert_eq!(candidates[0].name, "");
        assert_eq!(candidates[0].artist_line(), "Solo");
        assert_eq!(candidates[0].album, "");
        assert_eq!(candidates[0].cover_url, None);
        assert_eq!(candidates[1].remote_id, "ok2");
        assert!(candidates[1].artists.is_empty());
    }

    #[test]
    fn test_lyric_response() {
        let envelope: Envelope<LyricData> =
            serde_json::from_str(r#"{"data": {"lyric": "[00:01.00]hello"}}"#).unwrap();
        assert_eq!(lyric_from(envelope).as_deref(), Some("[00:01.00]hello"));

        let envelope: Envelope<LyricData> =
            serde_json::from_str(r#"{"data": {"lyric": "  "}}"#).unwrap();
        assert_eq!(lyric_from(envelope), None);

        let envelope: Envelope<LyricData> = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert_eq!(lyric_from(envelope), None);
    }
}
