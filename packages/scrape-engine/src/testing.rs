//! Testing utilities including mock implementations.
//!
//! Lets callers exercise the engine without network access: scripted
//! strategies, static robots documents, fixed healing suggestions, and an
//! in-memory record sink.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::healing::{HealingSuggestion, SelectorHealingRequest, SuggestionGenerator};

pub use crate::compliance::StaticRobotsSource;
pub use crate::store::MemoryRecordStore;
pub use crate::strategies::{MockResponse, MockStrategy};

/// Suggestion generator returning a fixed list, with request tracking.
#[derive(Default)]
pub struct StaticSuggestionGenerator {
    suggestions: Vec<HealingSuggestion>,
    requests: Arc<RwLock<Vec<(String, String)>>>,
}

impl StaticSuggestionGenerator {
    pub fn new(suggestions: Vec<HealingSuggestion>) -> Self {
        Self {
            suggestions,
            requests: Arc::default(),
        }
    }

    /// `(source, field)` of every healing request seen.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl SuggestionGenerator for StaticSuggestionGenerator {
    async fn suggest(&self, request: &SelectorHealingRequest) -> Vec<HealingSuggestion> {
        self.requests
            .write()
            .unwrap()
            .push((request.source.clone(), request.field.clone()));
        self.suggestions.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}
