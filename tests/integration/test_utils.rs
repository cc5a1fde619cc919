//! Shared test utilities for integration tests
//!
//! Scripted collaborators (model provider, content agent, client connection)
//! with call counters, plus XDG environment isolation for config tests.

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tabmind::channel::ClientConnection;
use tabmind::agent::ContentAgent;
use tabmind::error::ApiError;
use tabmind::protocol::{ExtractReply, PingReply, PushMessage};
use tabmind::provider::{
    Availability, CompletionStream, DownloadEvent, DownloadEvents, ModelParams, ModelProvider,
    ProviderSession, SessionOptions,
};
use tabmind::types::ContextId;
use tempfile::TempDir;

/// Global mutex to serialize XDG environment variable access across all tests
static XDG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    home: Option<String>,
    xdg_config_home: Option<String>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            home: std::env::var("HOME").ok(),
            xdg_config_home: std::env::var("XDG_CONFIG_HOME").ok(),
        }
    }

    fn restore(self) {
        match self.home {
            Some(orig) => std::env::set_var("HOME", orig),
            None => std::env::remove_var("HOME"),
        }
        match self.xdg_config_home {
            Some(orig) => std::env::set_var("XDG_CONFIG_HOME", orig),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}

/// Run `f` with XDG_CONFIG_HOME and HOME pointed into `test_dir`, restoring them afterwards.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().to_str().unwrap());

    let result = f();

    env_state.restore();

    result
}

/// Yield to other tasks until `condition` holds.
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Counters shared between a scripted provider and its sessions
#[derive(Default)]
pub struct ProviderStats {
    pub availability_checks: AtomicUsize,
    pub downloads_started: AtomicUsize,
    pub sessions_created: AtomicUsize,
    pub streaming_calls: AtomicUsize,
    pub single_shot_calls: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub last_options: Mutex<Option<SessionOptions>>,
    pub last_prompt: Mutex<Option<String>>,
}

impl ProviderStats {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Provider whose behavior is fixed up front
pub struct ScriptedProvider {
    availability: Mutex<Result<Availability, String>>,
    params: ModelParams,
    download: Vec<DownloadEvent>,
    chunks: Vec<String>,
    fail_after: Option<usize>,
    live_stream: Mutex<Option<UnboundedReceiver<String>>>,
    streaming_supported: bool,
    reply: Mutex<String>,
    pub stats: Arc<ProviderStats>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            availability: Mutex::new(Ok(Availability::Available)),
            params: ModelParams {
                default_temperature: Some(1.0),
                max_temperature: Some(2.0),
                default_top_k: Some(3),
                max_top_k: Some(8),
            },
            download: Vec::new(),
            chunks: Vec::new(),
            fail_after: None,
            live_stream: Mutex::new(None),
            streaming_supported: true,
            reply: Mutex::new(String::new()),
            stats: Arc::new(ProviderStats::default()),
        }
    }

    pub fn with_availability(self, availability: Availability) -> Self {
        *self.availability.lock() = Ok(availability);
        self
    }

    pub fn with_availability_error(self, message: &str) -> Self {
        *self.availability.lock() = Err(message.to_string());
        self
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_download(mut self, events: Vec<DownloadEvent>) -> Self {
        self.download = events;
        self
    }

    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Fail the stream after `n` chunks
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Stream whatever the test sends on the paired sender
    pub fn with_live_stream(self, receiver: UnboundedReceiver<String>) -> Self {
        *self.live_stream.lock() = Some(receiver);
        self
    }

    pub fn without_streaming(mut self) -> Self {
        self.streaming_supported = false;
        self
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.set_reply(reply);
        self
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock() = reply.to_string();
    }

    pub fn set_availability(&self, availability: Availability) {
        *self.availability.lock() = Ok(availability);
    }

    pub fn shared(self) -> (Arc<ScriptedProvider>, Arc<ProviderStats>) {
        let stats = self.stats.clone();
        (Arc::new(self), stats)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn availability(&self) -> Result<Availability, ApiError> {
        self.stats.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.availability.lock().clone().map_err(ApiError::ProviderError)
    }

    async fn params(&self) -> Result<ModelParams, ApiError> {
        Ok(self.params)
    }

    async fn start_download(&self) -> Result<DownloadEvents, ApiError> {
        self.stats.downloads_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::iter(self.download.clone())))
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn ProviderSession>, ApiError> {
        self.stats.sessions_created.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_options.lock() = Some(options);
        Ok(Box::new(ScriptedSession {
            chunks: self.chunks.clone(),
            fail_after: self.fail_after,
            live_stream: Mutex::new(self.live_stream.lock().take()),
            streaming_supported: self.streaming_supported,
            reply: self.reply.lock().clone(),
            destroyed: AtomicBool::new(false),
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedSession {
    chunks: Vec<String>,
    fail_after: Option<usize>,
    live_stream: Mutex<Option<UnboundedReceiver<String>>>,
    streaming_supported: bool,
    reply: String,
    destroyed: AtomicBool,
    stats: Arc<ProviderStats>,
}

#[async_trait]
impl ProviderSession for ScriptedSession {
    async fn prompt_streaming(&self, prompt: &str) -> Result<CompletionStream, ApiError> {
        self.stats.streaming_calls.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_prompt.lock() = Some(prompt.to_string());
        if !self.streaming_supported {
            return Err(ApiError::StreamingUnsupported(
                "scripted provider has no streaming".to_string(),
            ));
        }
        if let Some(receiver) = self.live_stream.lock().take() {
            return Ok(Box::pin(receiver.map(Ok::<String, ApiError>)));
        }

        let mut items: Vec<Result<String, ApiError>> = Vec::new();
        for (index, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(index) {
                items.push(Err(ApiError::ProviderError("stream broke".to_string())));
                break;
            }
            items.push(Ok(chunk.clone()));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn prompt(&self, prompt: &str) -> Result<String, ApiError> {
        self.stats.single_shot_calls.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_prompt.lock() = Some(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            panic!("provider session destroyed twice");
        }
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Content agent with a fixed page and counters
pub struct ScriptedAgent {
    ready: AtomicBool,
    ready_after_activate: bool,
    content: Mutex<Option<String>>,
    title: String,
    pub pings: AtomicUsize,
    pub activations: AtomicUsize,
    pub extractions: AtomicUsize,
}

impl ScriptedAgent {
    /// Agent that is already loaded and serves `content`
    pub fn ready(content: &str, title: &str) -> Self {
        Self {
            ready: AtomicBool::new(true),
            ready_after_activate: true,
            content: Mutex::new(Some(content.to_string())),
            title: title.to_string(),
            pings: AtomicUsize::new(0),
            activations: AtomicUsize::new(0),
            extractions: AtomicUsize::new(0),
        }
    }

    /// Agent that never becomes ready
    pub fn unreachable() -> Self {
        Self {
            ready: AtomicBool::new(false),
            ready_after_activate: false,
            ..Self::ready("", "")
        }
    }

    /// Agent that needs one activation
    pub fn dormant(content: &str, title: &str) -> Self {
        Self {
            ready: AtomicBool::new(false),
            ..Self::ready(content, title)
        }
    }

    pub fn set_content(&self, content: Option<&str>) {
        *self.content.lock() = content.map(str::to_string);
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAgent for ScriptedAgent {
    async fn ping(&self, _context: ContextId) -> Result<PingReply, ApiError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ready.load(Ordering::SeqCst) {
            Ok(PingReply {
                alive: true,
                ready: true,
                url: String::new(),
                title: self.title.clone(),
            })
        } else {
            Err(ApiError::AgentUnreachable("no agent in context".to_string()))
        }
    }

    async fn activate(&self, _context: ContextId) -> Result<(), ApiError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        if self.ready_after_activate {
            self.ready.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn extract(&self, _context: ContextId) -> Result<ExtractReply, ApiError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        Ok(match self.content.lock().clone() {
            Some(content) => ExtractReply {
                success: true,
                content: Some(content),
                url: String::new(),
                title: self.title.clone(),
                error: None,
            },
            None => ExtractReply {
                success: false,
                content: None,
                url: String::new(),
                title: self.title.clone(),
                error: Some("nothing to extract".to_string()),
            },
        })
    }
}

/// Client connection that records every pushed message
#[derive(Default)]
pub struct RecordingConnection {
    messages: Mutex<Vec<PushMessage>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// `(chunk, fullResponse)` of every streaming message for `session_id`
    pub fn streamed(&self, session_id: &str) -> Vec<(String, String)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                PushMessage::StreamingResponse {
                    session_id: id,
                    chunk,
                    full_response,
                } if id == session_id => Some((chunk.clone(), full_response.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                PushMessage::DownloadProgress { progress } => Some(*progress),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ClientConnection for RecordingConnection {
    fn label(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &PushMessage) -> Result<(), ApiError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn keepalive(&self) -> Result<(), ApiError> {
        Ok(())
    }
}
