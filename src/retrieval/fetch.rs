//! Page fetch capability.
//!
//! A fetch never fails from the caller's point of view: timeouts, connection
//! errors and non-HTML content all come back as `None`.

use crate::config::SearchConfig;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Fetches the HTML body of a page, or nothing.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Fetch every URL concurrently. Results keep the order of `urls`,
/// regardless of which request finished first.
pub async fn fetch_all(fetcher: &dyn PageFetcher, urls: &[String]) -> Vec<Option<String>> {
    join_all(urls.iter().map(|url| fetcher.fetch(url))).await
}

/// HEAD-then-GET fetcher over reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create fetch client: {}", e))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    /// Run one network operation under the per-operation timeout.
    async fn bounded<T, F>(&self, url: &str, what: &str, operation: F) -> Option<T>
    where
        F: Future<Output = reqwest::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                debug!("{} {} failed: {}", what, url, e);
                None
            }
            Err(_) => {
                debug!("{} {} timed out after {:?}", what, url, self.timeout);
                None
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let head = self
            .bounded(url, "HEAD", self.client.head(url).send())
            .await?;

        let content_type = head
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        if !is_html(content_type) {
            debug!("Skipping {} (content type {:?})", url, content_type);
            return None;
        }

        self.bounded(url, "GET", async {
            self.client.get(url).send().await?.text().await
        })
        .await
    }
}

fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = "<html><body>光華國小校歌</body></html>";

    /// Local HTTP server answering every request with `content_type`.
    /// GET responses carry [`PAGE`]. Returns the base URL and the request
    /// lines seen so far.
    async fn serve(content_type: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&chunk[..n]),
                        }
                    }

                    let line = String::from_utf8_lossy(&request)
                        .lines()
                        .next()
                        .unwrap_or("")
                        .to_string();
                    let body = if line.starts_with("GET") { PAGE } else { "" };
                    log.lock().unwrap().push(line);

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        content_type,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        (url, seen)
    }

    fn fetcher(timeout_seconds: u64) -> HttpFetcher {
        let config = SearchConfig {
            timeout_seconds,
            ..SearchConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    /// Answers slower for earlier URLs so completion order is reversed.
    struct SlowFirstFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for SlowFirstFetcher {
        async fn fetch(&self, url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let position: u64 = url.trim_start_matches("https://site/").parse().unwrap();
            tokio::time::sleep(Duration::from_millis(60 - position * 20)).await;
            if position == 1 {
                None
            } else {
                Some(format!("page {}", position))
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_submission_order() {
        let fetcher = SlowFirstFetcher {
            calls: AtomicUsize::new(0),
        };
        let urls: Vec<String> = (0..3).map(|i| format!("https://site/{}", i)).collect();

        let pages = fetch_all(&fetcher, &urls).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            pages,
            vec![Some("page 0".to_string()), None, Some("page 2".to_string())]
        );
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("Text/HTML"));
        assert!(!is_html("application/pdf"));
        assert!(!is_html(""));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_absent() {
        let config = SearchConfig {
            timeout_seconds: 2,
            ..SearchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(fetcher.fetch("http://127.0.0.1:9/").await, None);
    }

    #[tokio::test]
    async fn test_html_page_is_fetched_after_head() {
        let (url, seen) = serve("text/html; charset=utf-8").await;

        let page = fetcher(5).fetch(&url).await;

        assert_eq!(page.as_deref(), Some(PAGE));
        let lines = seen.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("HEAD "));
        assert!(lines[1].starts_with("GET "));
    }

    #[tokio::test]
    async fn test_non_html_head_skips_get() {
        let (url, seen) = serve("application/pdf").await;

        assert_eq!(fetcher(5).fetch(&url).await, None);

        let lines = seen.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("HEAD "));
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            // Accept and hold the connection without ever replying.
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let started = Instant::now();
        let page = fetcher(1).fetch(&url).await;

        assert_eq!(page, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
