//! Integration tests for page extraction through the host
//!
//! Tests cover:
//! - Restricted contexts are never probed
//! - Agent activation and the two-probe limit
//! - Content truncation
//! - Fallback payloads and their reasons
//! - Context lifecycle notifications

use super::test_utils::*;
use std::sync::Arc;
use tabmind::config::TabmindConfig;
use tabmind::host::Host;
use tabmind::protocol::{PageContentResponse, Request, Response};
use tabmind::provider::{Availability, ModelProvider};
use tabmind::suggestions::FALLBACK_SUGGESTIONS;
use tabmind::types::ContextId;

const CTX: ContextId = ContextId(7);
const SUGGESTIONS: &str = "1. What is Rust?\n2. Who maintains it?\n3. Why use it?";

fn create_host(provider: Option<Arc<ScriptedProvider>>, agent: Arc<ScriptedAgent>) -> Host {
    let provider = provider.map(|p| p as Arc<dyn ModelProvider>);
    Host::new(&TabmindConfig::default(), provider, agent)
}

async fn activate(host: &Host, context: ContextId, url: &str, title: &str) {
    let response = host
        .dispatch(Request::ContextActivated {
            context_id: context,
            url: url.to_string(),
            title: title.to_string(),
        })
        .await;
    assert!(response.is_none());
}

async fn page_content(host: &Host, context: Option<ContextId>) -> Response {
    host.dispatch(Request::GetPageContent { context_id: context })
        .await
        .unwrap()
}

fn expect_page(response: Response) -> PageContentResponse {
    match response {
        Response::PageContent(page) => page,
        other => panic!("expected page content, got {:?}", other),
    }
}

#[tokio::test]
async fn test_restricted_context_gets_fallback_without_probe() {
    let agent = Arc::new(ScriptedAgent::ready("text", "Settings"));
    let host = create_host(None, agent.clone());
    activate(&host, CTX, "chrome://settings", "Settings").await;

    let page = expect_page(page_content(&host, None).await);

    assert!(page.fallback);
    assert_eq!(page.reason.as_deref(), Some("restricted:browser_internal"));
    assert_eq!(page.suggestions, FALLBACK_SUGGESTIONS.to_vec());
    assert!(!page.ai_generated);
    assert!(page.content.is_empty());
    assert_eq!(page.url, "chrome://settings");
    assert_eq!(agent.pings(), 0);
    assert_eq!(agent.activations(), 0);
}

#[tokio::test]
async fn test_long_content_is_truncated_with_marker() {
    let (provider, _stats) = ScriptedProvider::new().with_reply(SUGGESTIONS).shared();
    let agent = Arc::new(ScriptedAgent::ready(&"a".repeat(2_500), "Long page"));
    let host = create_host(Some(provider), agent.clone());
    activate(&host, CTX, "https://example.com/long", "Long page").await;

    let page = expect_page(page_content(&host, None).await);

    assert!(!page.fallback);
    assert_eq!(page.content.chars().count(), 2_003);
    assert!(page.content.starts_with(&"a".repeat(2_000)));
    assert!(page.content.ends_with("..."));
    assert_eq!(page.url, "https://example.com/long");
    assert_eq!(page.title, "Long page");
    assert!(page.ai_generated);
    assert_eq!(
        page.suggestions,
        vec!["What is Rust?", "Who maintains it?", "Why use it?"]
    );
    assert_eq!(agent.pings(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dormant_agent_is_activated_once() {
    let (provider, _stats) = ScriptedProvider::new().with_reply(SUGGESTIONS).shared();
    let agent = Arc::new(ScriptedAgent::dormant("Some article text", "Article"));
    let host = create_host(Some(provider), agent.clone());
    activate(&host, CTX, "https://example.com/a", "Article").await;

    let page = expect_page(page_content(&host, Some(CTX)).await);

    assert!(!page.fallback);
    assert_eq!(page.content, "Some article text");
    assert_eq!(agent.pings(), 2);
    assert_eq!(agent.activations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_agent_gets_fallback_after_two_probes() {
    let agent = Arc::new(ScriptedAgent::unreachable());
    let host = create_host(None, agent.clone());
    activate(&host, CTX, "https://example.com/b", "B").await;

    let page = expect_page(page_content(&host, None).await);

    assert!(page.fallback);
    assert_eq!(page.reason.as_deref(), Some("agent_unreachable"));
    assert_eq!(page.title, "B");
    assert_eq!(agent.pings(), 2);
    assert_eq!(agent.activations(), 1);
}

#[tokio::test]
async fn test_failed_extraction_gets_fallback() {
    let agent = Arc::new(ScriptedAgent::ready("unused", "Empty"));
    agent.set_content(None);
    let host = create_host(None, agent.clone());
    activate(&host, CTX, "https://example.com/c", "Empty").await;

    let page = expect_page(page_content(&host, None).await);
    assert_eq!(page.reason.as_deref(), Some("extraction_failed"));

    agent.set_content(Some("   \n  "));
    let page = expect_page(page_content(&host, None).await);
    assert_eq!(page.reason.as_deref(), Some("extraction_failed"));
}

#[tokio::test]
async fn test_unavailable_model_still_returns_content() {
    let (provider, stats) = ScriptedProvider::new()
        .with_availability(Availability::Unavailable)
        .shared();
    let agent = Arc::new(ScriptedAgent::ready("Readable text", "Doc"));
    let host = create_host(Some(provider), agent);
    activate(&host, CTX, "https://example.com/doc", "Doc").await;

    let page = expect_page(page_content(&host, None).await);

    assert!(!page.fallback);
    assert_eq!(page.content, "Readable text");
    assert!(!page.ai_generated);
    assert_eq!(page.suggestions, FALLBACK_SUGGESTIONS.to_vec());
    assert_eq!(ProviderStats::count(&stats.sessions_created), 0);
}

#[tokio::test]
async fn test_no_active_context_is_an_error() {
    let host = create_host(None, Arc::new(ScriptedAgent::ready("x", "x")));
    match page_content(&host, None).await {
        Response::Error(err) => assert_eq!(err.error, "No active page"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_closing_active_context_clears_it() {
    let host = create_host(None, Arc::new(ScriptedAgent::ready("x", "x")));
    activate(&host, CTX, "https://example.com", "Home").await;
    assert_eq!(host.active_context(), Some(CTX));

    host.dispatch(Request::ContextClosed { context_id: CTX }).await;

    assert_eq!(host.active_context(), None);
    assert!(host.page(CTX).is_none());
    assert!(matches!(page_content(&host, None).await, Response::Error(_)));
}

#[tokio::test]
async fn test_navigation_discards_agent_status() {
    let (provider, _stats) = ScriptedProvider::new().with_reply(SUGGESTIONS).shared();
    let host = create_host(Some(provider), Arc::new(ScriptedAgent::ready("text", "One")));
    activate(&host, CTX, "https://example.com/one", "One").await;
    page_content(&host, None).await;
    assert!(host.supervisor().status(CTX).is_some());

    host.dispatch(Request::ContextNavigated {
        context_id: CTX,
        url: "https://example.com/two".to_string(),
        title: None,
    })
    .await;

    assert!(host.supervisor().status(CTX).is_none());
    let page = host.page(CTX).unwrap();
    assert_eq!(page.url, "https://example.com/two");
    assert!(page.title.is_empty(), "title of the previous page is dropped");
}

#[tokio::test]
async fn test_agent_announcement_records_ready_status() {
    let host = create_host(None, Arc::new(ScriptedAgent::ready("x", "x")));
    host.dispatch(Request::ContentScriptReady {
        context_id: CTX,
        url: "https://example.com/ready".to_string(),
        title: "Ready".to_string(),
    })
    .await;

    let status = host.supervisor().status(CTX).unwrap();
    assert!(status.ready);
    assert_eq!(status.url, "https://example.com/ready");
    assert_eq!(host.page(CTX).unwrap().title, "Ready");
}
