//! Remote asset retrieval.
//!
//! A single HTTP GET per asset, streamed chunk by chunk into a file issued by
//! the run's [`ScratchArena`]. No retries.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::arena::ScratchArena;
use crate::error::{MediaError, MediaResult};

/// Longest URL extension carried over to the scratch file name.
const MAX_EXTENSION_LEN: usize = 5;

/// Materializes a remote URL into a local file inside an arena.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch `url` into a new arena file whose name starts with `stem`.
    async fn fetch(&self, url: &str, arena: &ScratchArena, stem: &str) -> MediaResult<PathBuf>;
}

/// HTTP implementation of [`AssetFetcher`].
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
}

impl ResourceFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::download_failed("", format!("HTTP client setup failed: {e}"), None))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for ResourceFetcher {
    async fn fetch(&self, url: &str, arena: &ScratchArena, stem: &str) -> MediaResult<PathBuf> {
        let parsed = Url::parse(url).map_err(|e| MediaError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MediaError::InvalidUrl(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let path = arena.allocate(&format!("{stem}.{}", url_extension(&parsed)))?;
        debug!(url, path = %path.display(), "Fetching remote asset");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| MediaError::download_failed(url, e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(
                url,
                format!("HTTP {status}"),
                Some(status.as_u16()),
            ));
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download_failed(url, e.to_string(), None))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(MediaError::download_failed(url, "empty response body", Some(status.as_u16())));
        }

        info!(url, bytes = written, "Fetched remote asset");
        Ok(path)
    }
}

/// Extension of the URL's last path segment, or `bin`.
fn url_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn arena(base: &TempDir) -> ScratchArena {
        ScratchArena::open(base.path(), &uuid::Uuid::new_v4().to_string())
            .await
            .unwrap()
    }

    fn fetcher() -> ResourceFetcher {
        ResourceFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_extension() {
        let ext = |s: &str| url_extension(&Url::parse(s).unwrap());
        assert_eq!(ext("https://res.example.com/music/Track.MP3"), "mp3");
        assert_eq!(ext("https://res.example.com/music/track.mp3?sig=abc"), "mp3");
        assert_eq!(ext("https://res.example.com/music/track"), "bin");
        assert_eq!(ext("https://res.example.com/a.b/track.verylongext"), "bin");
        assert_eq!(ext("https://res.example.com/"), "bin");
    }

    #[tokio::test]
    async fn test_fetch_writes_body_into_arena() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/music/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let base = TempDir::new().unwrap();
        let arena = arena(&base).await;
        let url = format!("{}/music/song.mp3", server.uri());

        let local = fetcher().fetch(&url, &arena, "audio-0").await.unwrap();

        assert!(local.starts_with(arena.dir()));
        assert_eq!(local.extension().unwrap(), "mp3");
        assert_eq!(tokio::fs::read(&local).await.unwrap().len(), 4096);
        assert_eq!(arena.tracked(), vec![local]);
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = TempDir::new().unwrap();
        let arena = arena(&base).await;
        let url = format!("{}/missing.mp3", server.uri());

        let err = fetcher().fetch(&url, &arena, "audio-0").await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { status: Some(404), .. }));
        assert!(err.is_fetch_failure());
    }

    #[tokio::test]
    async fn test_fetch_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let base = TempDir::new().unwrap();
        let arena = arena(&base).await;
        let url = format!("{}/empty.mp3", server.uri());

        let err = fetcher().fetch(&url, &arena, "audio-0").await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));

        // The partial file is still tracked for cleanup
        assert_eq!(arena.tracked().len(), 1);
        arena.release().await.unwrap();
        assert!(!arena.dir().exists());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http() {
        let base = TempDir::new().unwrap();
        let arena = arena(&base).await;

        let err = fetcher()
            .fetch("ftp://example.com/a.mp3", &arena, "audio-0")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidUrl(_)));
        assert!(arena.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let base = TempDir::new().unwrap();
        let arena = arena(&base).await;

        // Grab a free port, then close it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/a.mp3");

        let err = fetcher().fetch(&url, &arena, "audio-0").await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { status: None, .. }));
    }
}
