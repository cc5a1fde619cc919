//! Content agent that fetches pages over HTTP.
//!
//! Contexts are bound to a locator by the host. Activation fetches the page and
//! keeps its visible text; until then the agent answers pings as not ready.

use super::ContentAgent;
use crate::error::ApiError;
use crate::protocol::{ExtractReply, PingReply};
use crate::types::ContextId;
use async_trait::async_trait;
use parking_lot::Mutex;
use html2text::render::TrivialDecorator;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
struct LoadedPage {
    title: String,
    text: String,
}

#[derive(Debug, Clone, Default)]
struct BoundContext {
    url: String,
    page: Option<LoadedPage>,
}

pub struct HttpPageAgent {
    client: Client,
    contexts: Mutex<HashMap<ContextId, BoundContext>>,
}

impl HttpPageAgent {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(PAGE_FETCH_TIMEOUT)
            .build()
            .map_err(|e| ApiError::AgentUnreachable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            contexts: Mutex::new(HashMap::new()),
        })
    }

    /// Point `context` at `url`, dropping any page loaded for a previous locator.
    pub fn bind(&self, context: ContextId, url: &str) {
        let mut contexts = self.contexts.lock();
        let entry = contexts.entry(context).or_default();
        if entry.url != url {
            entry.url = url.to_string();
            entry.page = None;
        }
    }

    pub fn unbind(&self, context: ContextId) {
        self.contexts.lock().remove(&context);
    }

    fn bound(&self, context: ContextId) -> Result<BoundContext, ApiError> {
        self.contexts
            .lock()
            .get(&context)
            .cloned()
            .ok_or_else(|| ApiError::AgentUnreachable(format!("{} is not bound", context)))
    }
}

#[async_trait]
impl ContentAgent for HttpPageAgent {
    async fn ping(&self, context: ContextId) -> Result<PingReply, ApiError> {
        let bound = self.bound(context)?;
        Ok(match bound.page {
            Some(page) => PingReply {
                alive: true,
                ready: true,
                url: bound.url,
                title: page.title,
            },
            None => PingReply {
                alive: false,
                ready: false,
                url: bound.url,
                title: String::new(),
            },
        })
    }

    async fn activate(&self, context: ContextId) -> Result<(), ApiError> {
        let bound = self.bound(context)?;
        debug!(context_id = %context, url = %bound.url, "Fetching page");

        let response = self
            .client
            .get(&bound.url)
            .send()
            .await
            .map_err(|e| ApiError::AgentUnreachable(format!("fetch failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ApiError::AgentUnreachable(format!(
                "fetch returned status {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| ApiError::AgentUnreachable(format!("read failed: {}", e)))?;

        let page = parse_page(&html);

        let mut contexts = self.contexts.lock();
        match contexts.get_mut(&context) {
            // The context may have navigated while the fetch was running.
            Some(entry) if entry.url == bound.url => entry.page = Some(page),
            _ => warn!(context_id = %context, "Context changed during fetch; discarding page"),
        }
        Ok(())
    }

    fn context_located(&self, context: ContextId, url: &str) {
        self.bind(context, url);
    }

    fn context_closed(&self, context: ContextId) {
        self.unbind(context);
    }

    async fn extract(&self, context: ContextId) -> Result<ExtractReply, ApiError> {
        let bound = self.bound(context)?;
        Ok(match bound.page {
            Some(page) if !page.text.is_empty() => ExtractReply {
                success: true,
                content: Some(page.text),
                url: bound.url,
                title: page.title,
                error: None,
            },
            Some(page) => ExtractReply {
                success: false,
                content: None,
                url: bound.url,
                title: page.title,
                error: Some("page has no visible text".to_string()),
            },
            None => ExtractReply {
                success: false,
                content: None,
                url: bound.url,
                title: String::new(),
                error: Some("page not loaded".to_string()),
            },
        })
    }
}

/// Width handed to the text renderer; wide enough that it never wraps a line.
const RENDER_WIDTH: usize = 10_000;

/// Title and visible text of a fetched page.
fn parse_page(html: &str) -> LoadedPage {
    let document = Html::parse_document(html);
    LoadedPage {
        title: extract_title(&document).unwrap_or_default(),
        text: visible_text(&document),
    }
}

/// `<title>` first, then `og:title`.
fn extract_title(document: &Html) -> Option<String> {
    if let Some(title) = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
    {
        let text = collapse_whitespace(&title.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
    }

    Selector::parse(r#"meta[property="og:title"]"#)
        .ok()
        .and_then(|s| document.select(&s).next())
        .and_then(|og| og.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|text| !text.is_empty())
}

/// Visible text of the document body, whitespace collapsed.
fn visible_text(document: &Html) -> String {
    let body = match Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
    {
        Some(body) => body.html(),
        None => return String::new(),
    };
    let rendered = html2text::from_read_with_decorator(
        body.as_bytes(),
        RENDER_WIDTH,
        TrivialDecorator::new(),
    )
    .unwrap_or_default();
    collapse_whitespace(&rendered)
}

/// Visible text of an HTML document.
pub fn html_to_text(html: &str) -> String {
    visible_text(&Html::parse_document(html))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
