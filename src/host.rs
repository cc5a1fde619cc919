//! Host state container and request dispatch.
//!
//! Everything the coordination layer keeps lives in one [`Host`], built once at
//! startup. Restarting means building a new one. Requests are dispatched with an
//! exhaustive match, so a new request variant cannot go unhandled.

use crate::agent::{truncate_content, ContentAgent, ContentAgentSupervisor, Readiness};
use crate::channel::ChannelRegistry;
use crate::config::TabmindConfig;
use crate::error::ApiError;
use crate::model::{ModelLifecycleManager, SamplingConfig};
use crate::protocol::{
    CancelResponse, ErrorResponse, PageContentResponse, PromptResponse, Request,
    RequestEnvelope, Response, ResponseEnvelope,
};
use crate::provider::ModelProvider;
use crate::session::{GenerationRequest, SessionCoordinator};
use crate::suggestions::{fallback_suggestions, fingerprint, suggestion_prompt, SuggestionCache};
use crate::types::{new_session_id, ContextId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Last known location of a page context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

#[derive(Default)]
struct PageDirectory {
    pages: HashMap<ContextId, PageInfo>,
    active: Option<ContextId>,
}

pub struct Host {
    channels: ChannelRegistry,
    supervisor: ContentAgentSupervisor,
    model: Arc<ModelLifecycleManager>,
    coordinator: SessionCoordinator,
    cache: SuggestionCache,
    sampling: SamplingConfig,
    pages: Mutex<PageDirectory>,
}

impl Host {
    pub fn new(
        config: &TabmindConfig,
        provider: Option<Arc<dyn ModelProvider>>,
        agent: Arc<dyn ContentAgent>,
    ) -> Self {
        let channels = ChannelRegistry::new(config.channel.clone());
        let model = Arc::new(ModelLifecycleManager::new(
            provider,
            channels.clone(),
            config.model.clone(),
        ));
        Self {
            supervisor: ContentAgentSupervisor::new(agent, config.agent.clone()),
            coordinator: SessionCoordinator::new(model.clone(), channels.clone()),
            cache: SuggestionCache::new(&config.cache),
            sampling: config.sampling.clone(),
            pages: Mutex::new(PageDirectory::default()),
            channels,
            model,
        }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn supervisor(&self) -> &ContentAgentSupervisor {
        &self.supervisor
    }

    pub fn model(&self) -> &ModelLifecycleManager {
        &self.model
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    pub fn active_context(&self) -> Option<ContextId> {
        self.pages.lock().active
    }

    pub fn page(&self, context: ContextId) -> Option<PageInfo> {
        self.pages.lock().pages.get(&context).cloned()
    }

    /// Decode one JSON line, dispatch it and pair the answer with the request id.
    pub async fn handle_line(&self, line: &str) -> Option<ResponseEnvelope> {
        match serde_json::from_str::<RequestEnvelope>(line) {
            Ok(envelope) => {
                let id = envelope.id;
                self.dispatch(envelope.request)
                    .await
                    .map(|response| ResponseEnvelope { id, response })
            }
            Err(err) => {
                let id = serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|value| value.get("id").cloned());
                let err = ApiError::from(err);
                warn!(error = %err, "Rejected request line");
                Some(ResponseEnvelope {
                    id,
                    response: Response::Error(ErrorResponse {
                        error: err.to_string(),
                    }),
                })
            }
        }
    }

    /// Handle one request. Notifications produce no response.
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        debug!(action = request.action(), "Dispatching request");
        match request {
            Request::GetPageContent { context_id } => {
                Some(self.get_page_content(context_id).await)
            }
            Request::PromptApi {
                prompt,
                context,
                session_id,
            } => Some(Response::Prompt(
                self.prompt_api(prompt, context, session_id).await,
            )),
            Request::CancelSession { session_id } => Some(Response::Cancel(CancelResponse {
                success: self.coordinator.cancel(&session_id),
            })),
            Request::CheckApiAvailability => Some(Response::Availability(
                self.model.check_availability().await,
            )),
            Request::ContentScriptReady {
                context_id,
                url,
                title,
            } => {
                self.supervisor.note_ready(context_id, &url, &title);
                self.record_page(context_id, url, Some(title));
                None
            }
            Request::ContextActivated {
                context_id,
                url,
                title,
            } => {
                self.supervisor.on_activated(context_id, &url);
                self.record_page(context_id, url, Some(title));
                self.pages.lock().active = Some(context_id);
                None
            }
            Request::ContextNavigated {
                context_id,
                url,
                title,
            } => {
                self.supervisor.on_navigated(context_id, &url);
                self.record_page(context_id, url, title);
                None
            }
            Request::ContextClosed { context_id } => {
                self.supervisor.on_closed(context_id);
                let mut pages = self.pages.lock();
                pages.pages.remove(&context_id);
                if pages.active == Some(context_id) {
                    pages.active = None;
                }
                None
            }
        }
    }

    fn record_page(&self, context: ContextId, url: String, title: Option<String>) {
        let mut pages = self.pages.lock();
        let page = pages.pages.entry(context).or_default();
        if page.url != url {
            page.title.clear();
        }
        page.url = url;
        if let Some(title) = title {
            page.title = title;
        }
    }

    async fn get_page_content(&self, context_id: Option<ContextId>) -> Response {
        let Some(context) = context_id.or_else(|| self.active_context()) else {
            return Response::Error(ErrorResponse {
                error: "No active page".to_string(),
            });
        };
        let page = self.page(context).unwrap_or_default();

        match self.supervisor.check_readiness(context, &page.url).await {
            Readiness::Ready => {}
            Readiness::Restricted(restriction) => {
                return fallback_page(&page, format!("restricted:{}", restriction));
            }
            Readiness::NotReady => return fallback_page(&page, "agent_unreachable".to_string()),
        }

        let extracted = match self.supervisor.extract(context).await {
            Ok(extracted) => extracted,
            Err(err) => {
                warn!(context_id = %context, error = %err, "Extraction failed; answering with fallback");
                let reason = match err {
                    ApiError::AgentUnreachable(_) => "agent_unreachable",
                    _ => "extraction_failed",
                };
                return fallback_page(&page, reason.to_string());
            }
        };

        let title = if extracted.title.is_empty() {
            page.title.clone()
        } else {
            extracted.title.clone()
        };
        let url = if extracted.url.is_empty() {
            page.url.clone()
        } else {
            extracted.url.clone()
        };

        let key = fingerprint(&extracted.content, &title);
        let suggestions = self
            .cache
            .get_or_generate(&key, || {
                self.generate_suggestions(title.clone(), extracted.content.clone())
            })
            .await;
        info!(
            context_id = %context,
            source = ?suggestions.source,
            "Page content ready"
        );

        Response::PageContent(PageContentResponse {
            content: extracted.content,
            title,
            url,
            ai_generated: suggestions.ai_generated(),
            suggestions: suggestions.to_vec(),
            fallback: false,
            reason: None,
        })
    }

    async fn generate_suggestions(&self, title: String, content: String) -> Result<String, ApiError> {
        let request = GenerationRequest::single_shot(suggestion_prompt(&title, &content))
            .with_temperature(self.sampling.suggestions);
        let outcome = self.coordinator.run(request).await?;
        if outcome.cancelled {
            return Err(ApiError::GenerationFailed(
                "suggestion generation was cancelled".to_string(),
            ));
        }
        Ok(outcome.text)
    }

    async fn prompt_api(
        &self,
        prompt: String,
        context: Option<String>,
        session_id: Option<String>,
    ) -> PromptResponse {
        let session_id = session_id.unwrap_or_else(new_session_id);
        let max_chars = self.supervisor.config().max_content_chars;
        let context = context.map(|c| truncate_content(c.trim(), max_chars));
        let request = GenerationRequest::streaming(prompt)
            .with_session_id(session_id.clone())
            .with_context(context)
            .with_temperature(self.sampling.prompt);

        match self.coordinator.run(request).await {
            Ok(outcome) => PromptResponse {
                success: true,
                response: Some(outcome.text),
                error: None,
                original_error: None,
                session_id,
                cancelled: outcome.cancelled,
            },
            Err(err) => PromptResponse {
                success: false,
                response: None,
                error: Some(err.user_message()),
                original_error: Some(err.to_string()),
                session_id,
                cancelled: false,
            },
        }
    }
}

fn fallback_page(page: &PageInfo, reason: String) -> Response {
    debug!(url = %page.url, reason = %reason, "Answering page request with fallback");
    Response::PageContent(PageContentResponse {
        content: String::new(),
        title: page.title.clone(),
        url: page.url.clone(),
        suggestions: fallback_suggestions().to_vec(),
        ai_generated: false,
        fallback: true,
        reason: Some(reason),
    })
}
