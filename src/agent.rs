//! Content Agent Supervision
//!
//! A content agent runs inside a page context and extracts its text. Before
//! use it is probed; if it is not ready it gets one activation attempt and one
//! re-probe. Contexts where an agent can never run are rejected without any
//! probe. Agent status is discarded whenever the context navigates or closes.

use crate::error::ApiError;
use crate::protocol::{ExtractReply, PingReply};
use crate::types::ContextId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod http;
pub mod locator;

pub use http::HttpPageAgent;
pub use locator::{classify_locator, is_context_restricted, Restriction};

/// Marker appended to content cut at the character limit.
pub const TRUNCATION_MARKER: &str = "...";

/// Transport to the extraction agent of a page context.
#[async_trait]
pub trait ContentAgent: Send + Sync {
    async fn ping(&self, context: ContextId) -> Result<PingReply, ApiError>;

    /// Load (inject) an agent into the context
    async fn activate(&self, context: ContextId) -> Result<(), ApiError>;

    async fn extract(&self, context: ContextId) -> Result<ExtractReply, ApiError>;

    /// Told where a context currently points. Agents that find pages on their own ignore it.
    fn context_located(&self, _context: ContextId, _url: &str) {}

    fn context_closed(&self, _context: ContextId) {}
}

/// Agent probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_extract_timeout_ms")]
    pub extract_timeout_ms: u64,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_extract_timeout_ms() -> u64 {
    10_000
}

fn default_max_content_chars() -> usize {
    2_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            extract_timeout_ms: default_extract_timeout_ms(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_timeout_ms == 0 {
            return Err("probe_timeout_ms must be greater than zero".to_string());
        }
        if self.extract_timeout_ms == 0 {
            return Err("extract_timeout_ms must be greater than zero".to_string());
        }
        if self.max_content_chars == 0 {
            return Err("max_content_chars must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }
}

/// Last known state of the agent in one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub context_id: ContextId,
    pub reachable: bool,
    pub ready: bool,
    pub last_probe: DateTime<Utc>,
    pub url: String,
    pub title: String,
}

/// Outcome of a readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Restricted(Restriction),
    NotReady,
}

/// Text extracted from a page, already truncated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub content: String,
    pub url: String,
    pub title: String,
}

#[derive(Default)]
struct StatusTable {
    statuses: HashMap<ContextId, AgentStatus>,
    // Bumped on every invalidation so probes that straddle one do not resurrect stale status.
    epochs: HashMap<ContextId, u64>,
}

impl StatusTable {
    fn epoch(&self, context: ContextId) -> u64 {
        self.epochs.get(&context).copied().unwrap_or(0)
    }
}

pub struct ContentAgentSupervisor {
    agent: Arc<dyn ContentAgent>,
    table: Mutex<StatusTable>,
    config: AgentConfig,
}

impl ContentAgentSupervisor {
    pub fn new(agent: Arc<dyn ContentAgent>, config: AgentConfig) -> Self {
        Self {
            agent,
            table: Mutex::new(StatusTable::default()),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn status(&self, context: ContextId) -> Option<AgentStatus> {
        self.table.lock().statuses.get(&context).cloned()
    }

    /// Probe, activate once if needed, probe again. At most two probes.
    pub async fn check_readiness(&self, context: ContextId, locator: &str) -> Readiness {
        if let Some(restriction) = classify_locator(locator) {
            debug!(context_id = %context, %restriction, "Context restricted; skipping probe");
            return Readiness::Restricted(restriction);
        }

        if self.probe(context).await {
            return Readiness::Ready;
        }

        info!(context_id = %context, "Content agent not ready; activating");
        if let Err(err) = self.agent.activate(context).await {
            warn!(context_id = %context, error = %err, "Content agent activation failed");
        }
        tokio::time::sleep(self.config.settle_delay()).await;

        if self.probe(context).await {
            Readiness::Ready
        } else {
            warn!(context_id = %context, "Content agent still not ready after activation");
            Readiness::NotReady
        }
    }

    pub async fn ensure_ready(&self, context: ContextId, locator: &str) -> bool {
        self.check_readiness(context, locator).await == Readiness::Ready
    }

    async fn probe(&self, context: ContextId) -> bool {
        let epoch = self.table.lock().epoch(context);
        let reply = match tokio::time::timeout(self.config.probe_timeout(), self.agent.ping(context))
            .await
        {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(err)) => {
                debug!(context_id = %context, error = %err, "Content agent ping failed");
                None
            }
            Err(_) => {
                debug!(context_id = %context, "Content agent ping timed out");
                None
            }
        };

        let reachable = reply.as_ref().map(|r| r.alive).unwrap_or(false);
        let ready = reachable && reply.as_ref().map(|r| r.ready).unwrap_or(false);

        let mut table = self.table.lock();
        if table.epoch(context) != epoch {
            debug!(context_id = %context, "Context changed during probe; not recording status");
            return ready;
        }
        let (url, title) = match reply {
            Some(reply) => (reply.url, reply.title),
            None => table
                .statuses
                .get(&context)
                .map(|s| (s.url.clone(), s.title.clone()))
                .unwrap_or_default(),
        };
        table.statuses.insert(
            context,
            AgentStatus {
                context_id: context,
                reachable,
                ready,
                last_probe: Utc::now(),
                url,
                title,
            },
        );
        ready
    }

    /// Ask the agent for the page text.
    ///
    /// Transport failures are reported as `AgentUnreachable` and drop the
    /// recorded status; the caller falls back.
    pub async fn extract(&self, context: ContextId) -> Result<ExtractedPage, ApiError> {
        let reply = match tokio::time::timeout(
            self.config.extract_timeout(),
            self.agent.extract(context),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                self.forget(context);
                return Err(ApiError::AgentUnreachable(err.to_string()));
            }
            Err(_) => {
                self.forget(context);
                return Err(ApiError::AgentUnreachable(format!(
                    "extraction timed out after {}ms",
                    self.config.extract_timeout_ms
                )));
            }
        };

        if !reply.success {
            return Err(ApiError::ExtractionFailed(
                reply
                    .error
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            ));
        }

        let content = reply.content.unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::ExtractionFailed("page has no text".to_string()));
        }

        Ok(ExtractedPage {
            content: truncate_content(content, self.config.max_content_chars),
            url: reply.url,
            title: reply.title,
        })
    }

    /// Record an agent that announced itself as loaded.
    pub fn note_ready(&self, context: ContextId, url: &str, title: &str) {
        let mut table = self.table.lock();
        table.statuses.insert(
            context,
            AgentStatus {
                context_id: context,
                reachable: true,
                ready: true,
                last_probe: Utc::now(),
                url: url.to_string(),
                title: title.to_string(),
            },
        );
        debug!(context_id = %context, url = %url, "Content agent announced ready");
    }

    /// A context became the active one. Status recorded for another locator is dropped.
    pub fn on_activated(&self, context: ContextId, url: &str) {
        self.agent.context_located(context, url);
        let stale = self
            .table
            .lock()
            .statuses
            .get(&context)
            .map(|s| !s.url.is_empty() && s.url != url)
            .unwrap_or(false);
        if stale {
            self.invalidate(context);
        }
    }

    /// Discard status because the context moved to a new location.
    pub fn on_navigated(&self, context: ContextId, url: &str) -> bool {
        self.agent.context_located(context, url);
        self.invalidate(context)
    }

    /// Discard status because the context closed.
    pub fn on_closed(&self, context: ContextId) -> bool {
        self.agent.context_closed(context);
        let removed = self.invalidate(context);
        self.table.lock().epochs.remove(&context);
        removed
    }

    fn invalidate(&self, context: ContextId) -> bool {
        let mut table = self.table.lock();
        *table.epochs.entry(context).or_insert(0) += 1;
        table.statuses.remove(&context).is_some()
    }

    fn forget(&self, context: ContextId) {
        self.table.lock().statuses.remove(&context);
    }
}

/// Cut `text` to `max_chars` characters, appending the truncation marker when cut.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let mut truncated = text[..byte_index].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => text.to_string(),
    }
}
