//! Suggestion Cache
//!
//! Bounded FIFO cache of generated question triples keyed by page fingerprint.
//! Only complete triples are cached; a short or failed generation yields the
//! fixed fallback triple, which is never stored.

use crate::error::ApiError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use tracing::{debug, warn};

pub mod fingerprint;
pub mod parser;

pub use fingerprint::{fingerprint, normalize_text, Fingerprint};
pub use parser::{parse_numbered_line, parse_numbered_lines, MAX_SUGGESTIONS};

/// Returned whenever three usable suggestions could not be produced
pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "What is the main topic of this page?",
    "Can you summarize the key points?",
    "What are the most important takeaways?",
];

const SUGGESTION_PROMPT: &str = "Read the page below and write exactly three short questions a reader \
might ask about it. Each question must be specific to this page and at most 12 words. \
Answer with a numbered list (1., 2., 3.) and nothing else.";

/// Instructional prompt asking for three page-specific questions.
pub fn suggestion_prompt(title: &str, content: &str) -> String {
    format!(
        "{}\n\nTitle: {}\n\nContent:\n{}",
        SUGGESTION_PROMPT,
        title.trim(),
        content.trim()
    )
}

pub fn fallback_suggestions() -> [String; 3] {
    FALLBACK_SUGGESTIONS.map(String::from)
}

/// Cache bound configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    50
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Where a suggestion triple came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Cached,
    Generated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSet {
    pub items: [String; 3],
    pub source: SuggestionSource,
}

impl SuggestionSet {
    /// True when the items came from the model, now or earlier
    pub fn ai_generated(&self) -> bool {
        self.source != SuggestionSource::Fallback
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.items.to_vec()
    }
}

#[derive(Default)]
struct CacheState {
    order: VecDeque<Fingerprint>,
    entries: HashMap<Fingerprint, [String; 3]>,
}

pub struct SuggestionCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl SuggestionCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn get(&self, key: &Fingerprint) -> Option<[String; 3]> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Fingerprints from oldest to newest
    pub fn keys(&self) -> Vec<Fingerprint> {
        self.state.lock().order.iter().cloned().collect()
    }

    /// Store a triple, evicting the oldest entries beyond capacity. An existing
    /// entry is left unchanged and returned.
    pub fn insert(&self, key: Fingerprint, items: [String; 3]) -> [String; 3] {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(&key) {
            return existing.clone();
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, items.clone());
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.entries.remove(&evicted);
                debug!(fingerprint = %evicted, "Evicted suggestion entry");
            }
        }
        items
    }

    /// Return the cached triple or run `generate` and parse its answer.
    pub async fn get_or_generate<F, Fut>(&self, key: &Fingerprint, generate: F) -> SuggestionSet
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ApiError>>,
    {
        if let Some(items) = self.get(key) {
            debug!(fingerprint = %key, "Suggestion cache hit");
            return SuggestionSet {
                items,
                source: SuggestionSource::Cached,
            };
        }

        let raw = match generate().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(fingerprint = %key, error = %err, "Suggestion generation failed; using fallback");
                return fallback_set();
            }
        };

        let parsed = parse_numbered_lines(&raw);
        let items: [String; 3] = match parsed.try_into() {
            Ok(items) => items,
            Err(parsed) => {
                warn!(
                    fingerprint = %key,
                    found = parsed.len(),
                    "Model did not return three suggestions; using fallback"
                );
                return fallback_set();
            }
        };

        // Another caller may have filled the key while we were generating.
        let items = self.insert(key.clone(), items);
        SuggestionSet {
            items,
            source: SuggestionSource::Generated,
        }
    }
}

fn fallback_set() -> SuggestionSet {
    SuggestionSet {
        items: fallback_suggestions(),
        source: SuggestionSource::Fallback,
    }
}
