use std::fmt;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Text rendered in place of a signal that the page does not carry.
pub const MISSING: &str = "MISSING";

/// One extracted on-page signal. Absence is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Found(String),
    Missing,
}

impl Signal {
    fn from_text(text: &str) -> Self {
        let collapsed = collapse_whitespace(text);
        if collapsed.is_empty() {
            Signal::Missing
        } else {
            Signal::Found(collapsed)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Signal::Found(text) => text,
            Signal::Missing => MISSING,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Signal::Missing)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSignals {
    pub title: Signal,
    pub heading: Signal,
    pub description: Signal,
    /// Raw `href` values in document order, unresolved.
    pub links: Vec<String>,
}

/// Compiled selectors for the handful of elements an audit looks at.
#[derive(Debug)]
pub struct SignalReader {
    title: Selector,
    heading: Selector,
    meta: Selector,
    anchor: Selector,
}

impl SignalReader {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            title: selector("title")?,
            heading: selector("h1")?,
            meta: selector("meta[name]")?,
            anchor: selector("a[href]")?,
        })
    }

    pub fn read(&self, html: &str) -> PageSignals {
        let document = Html::parse_document(html);

        let title = first_text(&document, &self.title);
        let heading = first_text(&document, &self.heading);

        let description = document
            .select(&self.meta)
            .find(|el| {
                el.value()
                    .attr("name")
                    .is_some_and(|name| name.trim().eq_ignore_ascii_case("description"))
            })
            .and_then(|el| el.value().attr("content"))
            .map(Signal::from_text)
            .unwrap_or(Signal::Missing);

        let links = document
            .select(&self.anchor)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_owned)
            .collect();

        PageSignals {
            title,
            heading,
            description,
            links,
        }
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse css selector {css:?}: {err:?}"))
}

fn first_text(document: &Html, selector: &Selector) -> Signal {
    match document.select(selector).next() {
        Some(el) => Signal::from_text(&el.text().collect::<String>()),
        None => Signal::Missing,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
