//! Per-run state shared by every request pipeline.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::SourceAdapter;
use crate::compliance::ComplianceGate;
use crate::extract::ExtractionSpec;

/// Spaces requests to the same domain.
///
/// Each caller reserves the next free slot for its domain before sleeping,
/// so concurrent requests queue up instead of firing together.
#[derive(Default)]
pub struct DomainPacer {
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl DomainPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `domain` may be hit again, then hold it for `gap`.
    pub async fn wait_turn(&self, domain: &str, gap: Duration) {
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(domain).copied().map_or(now, |next| next.max(now));
            slots.insert(domain.to_string(), slot + gap);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// Everything scoped to one batch run: compliance cache, pacing, and
/// selector overrides accepted by healing.
pub struct RunContext {
    pub run_id: Uuid,
    pub gate: ComplianceGate,
    pub pacer: DomainPacer,
    pub cancel: CancellationToken,
    overrides: RwLock<HashMap<String, ExtractionSpec>>,
}

impl RunContext {
    pub fn new(gate: ComplianceGate, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            gate,
            pacer: DomainPacer::new(),
            cancel,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Extraction spec in effect for a source, including healed selectors.
    pub fn spec_for(&self, adapter: &dyn SourceAdapter) -> ExtractionSpec {
        self.overrides
            .read()
            .unwrap()
            .get(adapter.id())
            .cloned()
            .unwrap_or_else(|| adapter.extraction_spec())
    }

    /// Replace one field's selector for the rest of the run.
    pub fn override_selector(&self, source: &str, base: &ExtractionSpec, field: &str, selector: &str) {
        let mut overrides = self.overrides.write().unwrap();
        let current = overrides.get(source).unwrap_or(base);
        let updated = current.with_selector(field, selector);
        overrides.insert(source.to_string(), updated);
    }

    pub fn overridden_selector(&self, source: &str, field: &str) -> Option<String> {
        self.overrides
            .read()
            .unwrap()
            .get(source)
            .and_then(|spec| spec.selector(field))
    }
}
