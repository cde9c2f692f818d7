// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web search: a SearXNG-compatible JSON adapter, result filtering, and
//! readable-text extraction from result pages.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use aiko_config::model::WebConfig;
use aiko_core::traits::{PluginAdapter, WebSearchAdapter};
use aiko_core::types::{AdapterType, HealthStatus, WebSearchHit, WebSearchRequest};
use aiko_core::AikoError;
use aiko_resilience::with_timeout;

/// Hosts whose pages rarely carry readable text: video, streaming, search
/// engines, shops, file hosting, login-walled tools, image galleries.
const BLOCKED_DOMAINS: &[&str] = &[
    "youtube.com", "youtu.be", "vimeo.com", "dailymotion.com", "twitch.tv", "tiktok.com",
    "netflix.com", "hulu.com", "disneyplus.com", "spotify.com", "soundcloud.com",
    "google.com", "bing.com", "yahoo.com", "duckduckgo.com", "baidu.com",
    "flipboard.com", "feedly.com",
    "amazon.com", "ebay.com", "walmart.com", "aliexpress.com", "etsy.com",
    "bloomberg.com", "nasdaq.com", "marketwatch.com",
    "dropbox.com", "onedrive.live.com", "icloud.com", "mediafire.com", "box.com",
    "notion.so", "trello.com", "medium.com", "substack.com",
    "linkedin.com", "indeed.com", "glassdoor.com",
    "flickr.com", "imgur.com", "unsplash.com", "pexels.com",
    "chat.openai.com", "perplexity.ai", "character.ai",
];

static USELESS_PATH: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"/(login|signin|signup|auth|captcha|error|404|terms|privacy|cart|checkout|subscribe)\b")
        .ok()
});

static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{2,}\b").ok());

/// `[text][3]` link markup and `[3]: https://...` footnotes from html2text.
static LINK_MARK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\[\d+\]").ok());
static FOOTNOTE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^\[\d+\]: .*$").ok());
static SPACE_BEFORE_PUNCT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s+([.,!?;:)\]'])").ok());

/// Blocks with fewer words are navigation, buttons or captions.
const MIN_PARAGRAPH_WORDS: usize = 4;
const RENDER_WIDTH: usize = 200;

/// Drops hits that are unlikely to contain usable text.
#[derive(Debug, Clone)]
pub struct WebResultFilter {
    min_words: usize,
}

impl WebResultFilter {
    pub fn new(min_words: usize) -> Self {
        Self { min_words }
    }

    pub fn accepts(&self, hit: &WebSearchHit) -> bool {
        !is_blocked_url(&hit.url) && word_count(&hit.snippet) >= self.min_words
    }
}

/// Whether the URL is unparsable, on a blocked domain (or subdomain), or
/// points at a login, error or checkout style page.
pub fn is_blocked_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return true;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let blocked_host = BLOCKED_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")));
    let useless_path = USELESS_PATH
        .as_ref()
        .is_some_and(|re| re.is_match(&parsed.path().to_ascii_lowercase()));
    blocked_host || useless_path
}

/// Number of alphabetic words of two or more letters.
pub fn word_count(text: &str) -> usize {
    WORD.as_ref().map_or(0, |re| re.find_iter(text).count())
}

/// Paragraph text of an HTML page, at most `max_chars` characters.
///
/// Markup, link footnotes and short blocks (menus, buttons) are dropped;
/// paragraphs are separated by a blank line.
pub fn readable_text(html: &str, max_chars: usize) -> Result<String, AikoError> {
    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH)
        .map_err(|e| AikoError::provider(format!("failed to render page: {e}")))?;
    let rendered = match FOOTNOTE.as_ref() {
        Some(re) => re.replace_all(&rendered, "").into_owned(),
        None => rendered,
    };

    let paragraphs: Vec<String> = rendered
        .split("\n\n")
        .map(|block| {
            let joined = block.split_whitespace().collect::<Vec<_>>().join(" ");
            let joined = match LINK_MARK.as_ref() {
                Some(re) => re.replace_all(&joined, "$1").into_owned(),
                None => joined,
            };
            let joined = joined.replace('*', "");
            match SPACE_BEFORE_PUNCT.as_ref() {
                Some(re) => re.replace_all(&joined, "$1").trim().to_string(),
                None => joined.trim().to_string(),
            }
        })
        .filter(|p| word_count(p) >= MIN_PARAGRAPH_WORDS)
        .collect();

    let text = paragraphs.join("\n\n");
    if text.chars().count() <= max_chars {
        return Ok(text);
    }
    let mut capped: String = text.chars().take(max_chars).collect();
    capped.truncate(capped.trim_end().len());
    Ok(capped)
}

/// Downloads result pages and extracts their readable text.
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    min_words: usize,
    max_chars: usize,
}

impl PageFetcher {
    pub fn new(timeout: Duration, min_words: usize, max_chars: usize) -> Result<Self, AikoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AikoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            timeout,
            min_words,
            max_chars,
        })
    }

    pub fn from_config(config: &WebConfig) -> Result<Self, AikoError> {
        Self::new(
            Duration::from_millis(config.page_timeout_ms),
            config.min_page_words,
            config.max_page_chars,
        )
    }

    /// Readable text of the page at `url`.
    ///
    /// Non-HTML responses, error statuses and pages with fewer than
    /// `min_words` words of text are provider errors.
    pub async fn fetch(&self, url: &str) -> Result<String, AikoError> {
        let download = async {
            let response = self.client.get(url).send().await.map_err(|e| AikoError::Provider {
                message: format!("page request failed: {e}"),
                source: Some(Box::new(e)),
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(AikoError::provider(format!("page returned {status}")));
            }
            let is_html = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("html"));
            if !is_html {
                return Err(AikoError::provider("page is not HTML"));
            }
            response.text().await.map_err(|e| AikoError::Provider {
                message: format!("failed to read page: {e}"),
                source: Some(Box::new(e)),
            })
        };
        let html = with_timeout(self.timeout, download).await?;

        let text = readable_text(&html, self.max_chars)?;
        let words = word_count(&text);
        if words < self.min_words {
            return Err(AikoError::provider(format!(
                "page has {words} words of text, need {}",
                self.min_words
            )));
        }
        debug!(url, words, "page text extracted");
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

/// Web search over a SearXNG instance's JSON API.
pub struct SearxSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl SearxSearch {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AikoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AikoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SearxSearch {
    fn name(&self) -> &str {
        "searx"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WebSearch
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        match self.client.get(&self.endpoint).send().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl WebSearchAdapter for SearxSearch {
    async fn search(&self, request: WebSearchRequest) -> Result<Vec<WebSearchHit>, AikoError> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("format", "json".to_string()),
        ];
        if let Some(filter) = request.time_filter {
            params.push(("time_range", filter.to_string()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| AikoError::Provider {
                message: format!("web search request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AikoError::provider(format!("web search returned {status}")));
        }

        let body: SearxResponse = response.json().await.map_err(|e| AikoError::Provider {
            message: format!("failed to parse web search response: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(query = %request.query, results = body.results.len(), "web search answered");

        Ok(body
            .results
            .into_iter()
            .take(request.limit)
            .map(|r| WebSearchHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
            })
            .collect())
    }
}
