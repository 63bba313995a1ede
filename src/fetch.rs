use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom as _;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Identifying headers rotated across requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Why a single page produced no record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("request failed: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("read body: {0}")]
    Body(String),
    #[error("redirected off origin to {0}")]
    OffOrigin(String),
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Where the response came from once redirects were followed.
    pub final_url: Url,
    pub status: u16,
    pub body: String,
    pub truncated: bool,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`. Any non-2xx status is a failure.
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchFailure>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| anyhow::anyhow!("build page fetch http client: {err}"))?;

        Ok(Self {
            client,
            timeout,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchFailure> {
        let user_agent = pick_user_agent();

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(request_failure)?;

        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let (body, truncated) = read_text_limited(response, self.max_body_bytes).await?;
        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            body,
            truncated,
        })
    }
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("siteaudit/0.1")
}

fn request_failure(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network(err.to_string())
    }
}

async fn read_text_limited(
    mut resp: reqwest::Response,
    limit: usize,
) -> Result<(String, bool), FetchFailure> {
    let mut out: Vec<u8> = Vec::new();
    let mut truncated = false;

    loop {
        let chunk = match resp.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) if err.is_timeout() => return Err(FetchFailure::Timeout),
            Err(err) => return Err(FetchFailure::Body(err.to_string())),
        };
        if out.len() + chunk.len() > limit {
            let remaining = limit.saturating_sub(out.len());
            out.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok((String::from_utf8_lossy(&out).into_owned(), truncated))
}
