//! Integration tests for the suggestion cache, standalone and through the host

use super::test_utils::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tabmind::config::TabmindConfig;
use tabmind::error::ApiError;
use tabmind::host::Host;
use tabmind::protocol::{Request, Response};
use tabmind::provider::ModelProvider;
use tabmind::suggestions::{
    fingerprint, CacheConfig, Fingerprint, SuggestionCache, SuggestionSource, FALLBACK_SUGGESTIONS,
};
use tabmind::types::ContextId;

fn triple(prefix: &str) -> [String; 3] {
    [1, 2, 3].map(|n| format!("{} {}?", prefix, n))
}

#[tokio::test]
async fn test_identical_request_served_from_cache() {
    let cache = SuggestionCache::new(&CacheConfig::default());
    let key = Fingerprint::from("abc");
    let calls = AtomicUsize::new(0);
    let calls = &calls;

    let first = cache
        .get_or_generate(&key, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("1. Alpha?\n2. Beta?\n3. Gamma?".to_string())
        })
        .await;
    let second = cache
        .get_or_generate(&key, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("1. Other?\n2. Other?\n3. Other?".to_string())
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.source, SuggestionSource::Generated);
    assert_eq!(second.source, SuggestionSource::Cached);
    assert_eq!(first.items, second.items);
    assert_eq!(second.items, ["Alpha?", "Beta?", "Gamma?"].map(String::from));
}

#[test]
fn test_bound_evicts_first_inserted() {
    let cache = SuggestionCache::new(&CacheConfig { capacity: 50 });
    let keys: Vec<Fingerprint> = (0..51).map(|i| Fingerprint::from(format!("page-{}", i))).collect();

    for key in &keys {
        cache.insert(key.clone(), triple(key.as_str()));
    }

    assert_eq!(cache.len(), 50);
    assert!(!cache.contains(&keys[0]));
    for key in &keys[1..] {
        assert!(cache.contains(key), "{} should remain", key);
    }
    assert_eq!(cache.keys().first(), Some(&keys[1]));
}

#[tokio::test]
async fn test_extra_lines_trimmed_and_short_answers_discarded() {
    let cache = SuggestionCache::new(&CacheConfig::default());

    let five = Fingerprint::from("five");
    let set = cache
        .get_or_generate(&five, || async {
            Ok("1. One?\n2. Two?\n3. Three?\n4. Four?\n5. Five?".to_string())
        })
        .await;
    assert_eq!(set.items, ["One?", "Two?", "Three?"].map(String::from));
    assert_eq!(cache.get(&five), Some(set.items.clone()));

    let two = Fingerprint::from("two");
    let set = cache
        .get_or_generate(&two, || async { Ok("1. One?\n2. Two?".to_string()) })
        .await;
    assert_eq!(set.source, SuggestionSource::Fallback);
    assert_eq!(set.to_vec(), FALLBACK_SUGGESTIONS.to_vec());
    assert!(!cache.contains(&two));
}

#[tokio::test]
async fn test_generation_error_not_cached() {
    let cache = SuggestionCache::new(&CacheConfig::default());
    let key = Fingerprint::from("broken");

    let set = cache
        .get_or_generate(&key, || async {
            Err(ApiError::GenerationFailed("model crashed".to_string()))
        })
        .await;

    assert!(!set.ai_generated());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_concurrent_misses_keep_first_entry() {
    let cache = SuggestionCache::new(&CacheConfig::default());
    let key = Fingerprint::from("race");

    let (a, b) = tokio::join!(
        cache.get_or_generate(&key, || async { Ok("1. A?\n2. B?\n3. C?".to_string()) }),
        cache.get_or_generate(&key, || async { Ok("1. X?\n2. Y?\n3. Z?".to_string()) }),
    );

    assert_eq!(a.items, b.items);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_host_reuses_suggestions_for_same_page() {
    let (provider, stats) = ScriptedProvider::new()
        .with_reply("1. Why crabs?\n2. How fast?\n3. Who wrote it?")
        .shared();
    let agent = Arc::new(ScriptedAgent::ready("Crabs are fast.", "Crabs"));
    let host = Host::new(
        &TabmindConfig::default(),
        Some(provider.clone() as Arc<dyn ModelProvider>),
        agent.clone(),
    );
    host.dispatch(Request::ContextActivated {
        context_id: ContextId(1),
        url: "https://example.com/crabs".to_string(),
        title: "Crabs".to_string(),
    })
    .await;

    let mut answers = Vec::new();
    for _ in 0..2 {
        match host
            .dispatch(Request::GetPageContent { context_id: None })
            .await
        {
            Some(Response::PageContent(page)) => answers.push(page),
            other => panic!("expected page content, got {:?}", other),
        }
    }

    assert_eq!(ProviderStats::count(&stats.single_shot_calls), 1);
    assert_eq!(answers[0].suggestions, answers[1].suggestions);
    assert!(answers[1].ai_generated);
    assert!(host.cache().contains(&fingerprint("Crabs are fast.", "Crabs")));

    agent.set_content(Some("Crabs are slow after all."));
    provider.set_reply("1. Really?\n2. Since when?\n3. Says who?");
    match host
        .dispatch(Request::GetPageContent { context_id: None })
        .await
    {
        Some(Response::PageContent(page)) => {
            assert_eq!(page.suggestions[0], "Really?");
        }
        other => panic!("expected page content, got {:?}", other),
    }
    assert_eq!(ProviderStats::count(&stats.single_shot_calls), 2);
    assert_eq!(host.cache().len(), 2);
}
