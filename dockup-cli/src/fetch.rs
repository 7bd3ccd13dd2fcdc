//! Verified downloads
//!
//! HTTP fetches go through the [`Fetcher`] trait. The reqwest-backed
//! implementation applies timeouts and retries transient failures; digest
//! helpers check what was fetched before anything is installed.

use crate::config::DownloadConfig;
use crate::error::{
    ChecksumMismatchSnafu, DownloadSnafu, HttpClientSnafu, HttpStatusSnafu, OfflineSnafu,
    ProvisionError, Result,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, ensure};
use std::time::Duration;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("dockup/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(HttpClientSnafu)?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            client,
            retries: config.retries,
            backoff: config.retry_backoff(),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(DownloadSnafu { url })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                url,
                status: status.as_u16()
            }
        );

        let body = response.bytes().await.context(DownloadSnafu { url })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    tracing::debug!(url, bytes = body.len(), "downloaded");
                    return Ok(body);
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff * attempt;
                    tracing::warn!(url, attempt, ?delay, error = %e.chain(), "download failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Refuses every download. Used where steps are only described.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        OfflineSnafu { url }.fail()
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Pull the digest out of a `sha256sum`-style checksum file.
///
/// Accepts `<hex>  <name>`, `<hex> *<name>` or a bare digest. When several
/// lines are present, the one naming `asset` wins.
pub fn parse_checksum_file(content: &str, asset: &str) -> Option<String> {
    let mut fallback = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(digest) = fields.next() else {
            continue;
        };
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }
        let digest = digest.to_ascii_lowercase();

        match fields.next().map(|name| name.trim_start_matches('*')) {
            Some(name) if name == asset => return Some(digest),
            _ => {
                fallback.get_or_insert(digest);
            }
        }
    }

    fallback
}

/// Fail unless `data` hashes to `expected`
pub fn verify_sha256(url: &str, data: &[u8], expected: &str) -> Result<(), ProvisionError> {
    let actual = sha256_hex(data);
    ensure!(
        actual.eq_ignore_ascii_case(expected.trim()),
        ChecksumMismatchSnafu {
            url,
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ABC_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_sha256_hex() {
        assert_eq!(sha256_hex(b"abc"), ABC_DIGEST);
    }

    #[test]
    fn test_parse_checksum_file_formats() {
        let binary_mode = format!("{ABC_DIGEST} *docker-compose-linux-x86_64\n");
        assert_eq!(
            parse_checksum_file(&binary_mode, "docker-compose-linux-x86_64").as_deref(),
            Some(ABC_DIGEST)
        );

        let bare = format!("{}\n", ABC_DIGEST.to_uppercase());
        assert_eq!(
            parse_checksum_file(&bare, "anything").as_deref(),
            Some(ABC_DIGEST)
        );

        assert_eq!(parse_checksum_file("not a checksum\n", "x"), None);
    }

    #[test]
    fn test_parse_checksum_file_prefers_named_asset() {
        let other = "0".repeat(64);
        let content = format!(
            "{other}  docker-compose-linux-aarch64\n{ABC_DIGEST}  docker-compose-linux-x86_64\n"
        );
        assert_eq!(
            parse_checksum_file(&content, "docker-compose-linux-x86_64").as_deref(),
            Some(ABC_DIGEST)
        );
    }

    /// Serve one canned response per connection, in order, then stop
    /// accepting. Returns the URL and a count of requests received.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}/docker-compose-linux-x86_64"), hits)
    }

    fn local_fetcher() -> HttpFetcher {
        let config = DownloadConfig {
            timeout_secs: 5,
            connect_timeout_secs: 5,
            retries: 3,
            retry_backoff_ms: 1,
        };
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.timeout())
            .build()
            .unwrap();
        HttpFetcher::with_client(client, &config)
    }

    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const OK_HELLO: &str =
        "HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello";

    #[tokio::test]
    async fn test_fetch_retries_server_errors() {
        let (url, hits) = serve(vec![UNAVAILABLE, OK_HELLO]).await;

        let body = local_fetcher().fetch(&url).await.unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_client_errors() {
        let (url, hits) = serve(vec![NOT_FOUND, OK_HELLO]).await;

        let err = local_fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, ProvisionError::HttpStatus { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_retries() {
        let (url, hits) = serve(vec![UNAVAILABLE; 4]).await;

        let err = local_fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, ProvisionError::HttpStatus { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_offline_fetcher_refuses() {
        let err = OfflineFetcher.fetch("https://example.invalid/gpg").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Offline { .. }));
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        verify_sha256("https://example.invalid/abc", b"abc", ABC_DIGEST).unwrap();

        let err = verify_sha256("https://example.invalid/abc", b"abd", ABC_DIGEST).unwrap_err();
        assert!(matches!(err, ProvisionError::ChecksumMismatch { .. }));
    }
}
