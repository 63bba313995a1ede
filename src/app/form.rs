use std::time::Duration;

use serde::Deserialize;

use crate::audit::AuditConfig;
use crate::walk::{DelayRange, UrlIdentity, WalkConfig};

pub const MAX_PAGES_LIMIT: usize = 20;

/// Fields posted by the audit form.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditForm {
    pub url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Comma- or newline-separated model names, in priority order.
    #[serde(default)]
    pub models: String,
    /// HTML checkboxes post `on` when ticked and nothing otherwise.
    #[serde(default)]
    pub strip_fragments: Option<String>,
}

fn default_max_pages() -> usize {
    6
}

/// Server-wide knobs the form does not expose.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub models: Vec<String>,
    pub delay: DelayRange,
    pub max_elapsed: Duration,
    pub rate_limit_backoff: Duration,
    pub digest_max_chars: usize,
}

impl AuditForm {
    pub fn to_config(&self, defaults: &AppDefaults) -> anyhow::Result<AuditConfig> {
        if self.url.trim().is_empty() {
            anyhow::bail!("url is required");
        }
        if self.max_pages == 0 || self.max_pages > MAX_PAGES_LIMIT {
            anyhow::bail!("max pages must be between 1 and {MAX_PAGES_LIMIT}");
        }

        let mut models: Vec<String> = self
            .models
            .split([',', '\n'])
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_owned)
            .collect();
        if models.is_empty() {
            models = defaults.models.clone();
        }

        let url_identity = match self.strip_fragments.as_deref() {
            Some("on" | "true" | "1") => UrlIdentity::StripFragment,
            _ => UrlIdentity::AsIs,
        };

        Ok(AuditConfig {
            walk: WalkConfig {
                page_budget: self.max_pages,
                delay: defaults.delay,
                max_elapsed: Some(defaults.max_elapsed),
                url_identity,
                ..WalkConfig::default()
            },
            digest_max_chars: defaults.digest_max_chars,
            models,
            rate_limit_backoff: defaults.rate_limit_backoff,
        })
    }
}
