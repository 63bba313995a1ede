use std::collections::{HashSet, VecDeque};
use std::io::Write as _;
use std::time::Duration;

use anyhow::Context as _;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cli::{SiteArgs, WalkArgs};
use crate::fetch::{FetchFailure, HttpFetcher, PageFetcher};
use crate::signals::{Signal, SignalReader};

/// Signals extracted from one successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Signal,
    pub heading: Signal,
    pub description: Signal,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("malformed seed url {input:?}: {reason}")]
    MalformedSeed { input: String, reason: String },
}

/// How URLs are compared for the visited/frontier check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UrlIdentity {
    /// Every distinct URL string is its own page, fragments included.
    #[default]
    AsIs,
    /// `#fragment` is dropped before comparison and fetch.
    StripFragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub page_budget: usize,
    pub fetch_timeout: Duration,
    pub delay: DelayRange,
    pub max_elapsed: Option<Duration>,
    pub url_identity: UrlIdentity,
    pub max_body_bytes: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            page_budget: 6,
            fetch_timeout: Duration::from_secs(10),
            delay: DelayRange::from_millis(500, 1500),
            max_elapsed: Some(Duration::from_secs(120)),
            url_identity: UrlIdentity::AsIs,
            max_body_bytes: crate::fetch::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl WalkConfig {
    pub fn from_args(args: &SiteArgs) -> Self {
        Self {
            page_budget: usize::try_from(args.max_pages).unwrap_or(usize::MAX),
            fetch_timeout: Duration::from_secs(args.timeout_secs),
            delay: DelayRange::from_millis(args.delay_min_ms, args.delay_max_ms),
            max_elapsed: (args.max_elapsed_secs > 0)
                .then(|| Duration::from_secs(args.max_elapsed_secs)),
            url_identity: if args.strip_fragments {
                UrlIdentity::StripFragment
            } else {
                UrlIdentity::AsIs
            },
            max_body_bytes: crate::fetch::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BudgetMet,
    FrontierExhausted,
    DeadlineReached,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WalkSummary {
    pub pages: Vec<PageRecord>,
    pub failures: Vec<(String, FetchFailure)>,
    pub stop: StopReason,
}

/// Per-walk bookkeeping. Never shared between walks.
#[derive(Debug)]
struct WalkState {
    visited: HashSet<String>,
    frontier: VecDeque<Url>,
    origin: String,
    collected: Vec<PageRecord>,
}

impl WalkState {
    fn new(seed: Url, identity: UrlIdentity) -> Self {
        let origin = origin_of(&seed).unwrap_or_default();
        let mut frontier = VecDeque::new();
        frontier.push_back(identify(seed, identity));
        Self {
            visited: HashSet::new(),
            frontier,
            origin,
            collected: Vec::new(),
        }
    }

    /// Pops the next URL that has not been seen and marks it visited.
    fn next_unvisited(&mut self) -> Option<Url> {
        while let Some(url) = self.frontier.pop_front() {
            if self.visited.insert(url.as_str().to_owned()) {
                return Some(url);
            }
        }
        None
    }

    fn enqueue_links(&mut self, base: &Url, hrefs: &[String], identity: UrlIdentity) {
        for href in hrefs {
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            if origin_of(&resolved).as_deref() != Some(self.origin.as_str()) {
                continue;
            }
            let resolved = identify(resolved, identity);
            if self.visited.contains(resolved.as_str()) {
                continue;
            }
            self.frontier.push_back(resolved);
        }
    }
}

/// Bounded breadth-first walk over same-origin pages.
pub struct Walker<F> {
    fetcher: F,
    reader: SignalReader,
    config: WalkConfig,
}

impl Walker<HttpFetcher> {
    pub fn http(config: WalkConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout, config.max_body_bytes)
            .context("build page fetcher")?;
        Self::new(fetcher, config)
    }
}

impl<F: PageFetcher> Walker<F> {
    pub fn new(fetcher: F, config: WalkConfig) -> anyhow::Result<Self> {
        if config.page_budget == 0 {
            anyhow::bail!("page budget must be >= 1");
        }
        Ok(Self {
            fetcher,
            reader: SignalReader::new().context("compile html selectors")?,
            config,
        })
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Walks from `seed` and returns records in fetch order.
    pub async fn walk(&self, seed: &str) -> Result<Vec<PageRecord>, WalkError> {
        let summary = self
            .walk_with(seed, &CancellationToken::new(), |_| {})
            .await?;
        Ok(summary.pages)
    }

    /// Walks from `seed`, calling `on_page` after each collected page and
    /// stopping early once `cancel` fires.
    pub async fn walk_with(
        &self,
        seed: &str,
        cancel: &CancellationToken,
        mut on_page: impl FnMut(&PageRecord),
    ) -> Result<WalkSummary, WalkError> {
        let seed = parse_seed(seed)?;
        let started_at = Instant::now();
        let deadline = self.config.max_elapsed.map(|cap| started_at + cap);
        let mut state = WalkState::new(seed.clone(), self.config.url_identity);
        let mut failures = Vec::new();

        tracing::info!(
            seed = %seed,
            origin = %state.origin,
            budget = self.config.page_budget,
            "walk started"
        );

        let stop = loop {
            if state.collected.len() >= self.config.page_budget {
                break StopReason::BudgetMet;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break StopReason::DeadlineReached;
            }
            let Some(url) = state.next_unvisited() else {
                break StopReason::FrontierExhausted;
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break StopReason::Cancelled,
                outcome = self.visit_before(&url, &state.origin, deadline) => outcome,
            };

            match outcome {
                Some(Ok((record, links))) => {
                    tracing::info!(url = %record.url, "scraped");
                    state.enqueue_links(&url, &links, self.config.url_identity);
                    on_page(&record);
                    state.collected.push(record);
                }
                Some(Err(err)) => {
                    tracing::debug!(url = %url, %err, "skipping page");
                    failures.push((url.to_string(), err));
                }
                None => break StopReason::DeadlineReached,
            }
        };

        tracing::info!(
            pages = state.collected.len(),
            visited = state.visited.len(),
            failed = failures.len(),
            ?stop,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "walk finished"
        );

        Ok(WalkSummary {
            pages: state.collected,
            failures,
            stop,
        })
    }

    /// Runs `visit`, giving up with `None` if the walk deadline passes first.
    async fn visit_before(
        &self,
        url: &Url,
        origin: &str,
        deadline: Option<Instant>,
    ) -> Option<Result<(PageRecord, Vec<String>), FetchFailure>> {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.visit(url, origin))
                .await
                .ok(),
            None => Some(self.visit(url, origin).await),
        }
    }

    async fn visit(
        &self,
        url: &Url,
        origin: &str,
    ) -> Result<(PageRecord, Vec<String>), FetchFailure> {
        let pause = self.config.delay.sample();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let page = self.fetcher.fetch(url).await?;
        // A redirect may land on another site; that page is not ours to record.
        if origin_of(&page.final_url).as_deref() != Some(origin) {
            return Err(FetchFailure::OffOrigin(page.final_url.to_string()));
        }
        if page.truncated {
            tracing::debug!(url = %url, "response body truncated");
        }

        let signals = self.reader.read(&page.body);
        let record = PageRecord {
            url: url.to_string(),
            title: signals.title,
            heading: signals.heading,
            description: signals.description,
        };
        Ok((record, signals.links))
    }
}

/// Parses operator input into an absolute http(s) URL, prefixing
/// `https://` when no scheme was given.
pub fn parse_seed(input: &str) -> Result<Url, WalkError> {
    let trimmed = input.trim();
    let malformed = |reason: &str| WalkError::MalformedSeed {
        input: input.to_owned(),
        reason: reason.to_owned(),
    };

    if trimmed.is_empty() {
        return Err(malformed("empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|err| malformed(&err.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(malformed("scheme must be http/https"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(malformed("missing host")),
    }
}

/// Network location used for scoping: host plus an explicit port.
pub fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

fn identify(mut url: Url, identity: UrlIdentity) -> Url {
    if identity == UrlIdentity::StripFragment {
        url.set_fragment(None);
    }
    url
}

pub async fn run(args: WalkArgs) -> anyhow::Result<()> {
    let config = WalkConfig::from_args(&args.site);
    let walker = Walker::http(config).context("build walker")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing with pages collected so far");
            ctrl_c.cancel();
        }
    });

    let summary = walker
        .walk_with(&args.site.url, &cancel, |_| {})
        .await
        .context("walk site")?;

    if summary.pages.is_empty() {
        tracing::warn!(
            failures = summary.failures.len(),
            "walk collected no pages"
        );
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.digest {
        let digest = crate::digest::render(&summary.pages, args.site.digest_max_chars);
        writeln!(out, "{digest}").context("write digest")?;
    } else {
        for record in &summary.pages {
            serde_json::to_writer(&mut out, record).context("write page record json")?;
            out.write_all(b"\n").context("write page record newline")?;
        }
    }
    out.flush().context("flush stdout")?;

    Ok(())
}
