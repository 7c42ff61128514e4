//! One-shot crawl of the target's landing page before the first cycle.
//!
//! The page's links give the model something to generalise from, and the
//! response headers hint at the server stack.

use log::info;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Only the first anchors of a page are considered.
pub const MAX_SEED_LINKS: usize = 25;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
}

/// Links and headers scraped from the landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPage {
    pub links: Vec<String>,
    /// `HTTP/1.1 <status>` followed by one `Name: value` line per header.
    pub headers: String,
}

/// The page to crawl: the fuzz URL with the fuzzer keyword removed.
pub fn base_url(target_url: &str, keyword: &str) -> String {
    target_url.replace(keyword, "")
}

/// Extracts path-like hrefs from the first [`MAX_SEED_LINKS`] anchors.
///
/// Fragments, `javascript:` and `mailto:` links are skipped, absolute URLs are
/// reduced to their path, and leading slashes are removed.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&ANCHOR).take(MAX_SEED_LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        let path = if href.starts_with("http://") || href.starts_with("https://") {
            match reqwest::Url::parse(href) {
                Ok(url) => url.path().to_string(),
                Err(_) => continue,
            }
        } else {
            href.to_string()
        };
        let path = path.trim_start_matches('/');
        if !path.is_empty() && seen.insert(path.to_string()) {
            links.push(path.to_string());
        }
    }
    links
}

/// Renders a status line and headers the way they appear on the wire.
pub fn format_headers<'a>(
    status: u16,
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut lines = vec![format!("HTTP/1.1 {status}")];
    lines.extend(headers.into_iter().map(|(k, v)| format!("{k}: {v}")));
    lines.join("\n")
}

/// Fetches `url` and scrapes it. Certificate errors are ignored: targets are
/// often staging hosts with self-signed certificates.
pub fn fetch_seed_page(url: &str, timeout: Duration) -> Result<SeedPage, SeedError> {
    let fetch_err = |reason: String| SeedError::Fetch {
        url: url.to_string(),
        reason,
    };
    info!("Attempting to extract links from {url}");

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;
    let resp = client.get(url).send().map_err(|e| fetch_err(e.to_string()))?;

    let status = resp.status().as_u16();
    let header_pairs: Vec<(String, String)> = resp
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = resp.text().map_err(|e| fetch_err(e.to_string()))?;

    let links = extract_links(&body);
    info!("Successfully extracted {} links", links.len());
    Ok(SeedPage {
        links,
        headers: format_headers(
            status,
            header_pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ),
    })
}
