//! Scrape Orchestration and Extraction-Resilience Engine
//!
//! Ingests structured records from uncooperative web sources (filing
//! portals, depository holdings pages, statistics tables) while honouring
//! crawl-politeness rules, recovering from broken selectors, and pacing
//! batches so no source is overloaded.
//!
//! # Pipeline
//!
//! Each [`ScrapeRequest`] moves through:
//!
//! 1. [`ComplianceGate`] - robots permission and crawl-delay, once per domain per run
//! 2. [`Strategy`] - `http-fetch`, `headless-render` or `rendering-api`, escalating
//!    on content-shape failures and retrying transient errors with backoff
//! 3. [`Extractor`] and [`SelectorHealer`] - CSS extraction, with one validated
//!    healing pass when a selector stops matching
//! 4. [`SourceAdapter`] - normalization into a typed [`NormalizedRecord`]
//! 5. [`RecordSink`] - upsert by natural key
//!
//! The [`BatchScheduler`] runs many requests under a concurrency limit and
//! returns a [`BatchReport`]; [`ScrapeService`] wraps it with the external
//! invocation contract.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrape_engine::{ScrapeInvocation, ScrapeService};
//!
//! let response = service
//!     .invoke(ScrapeInvocation::new("ccass", vec!["00700".into()]).with_test_mode(true))
//!     .await?;
//! assert!(response.records_inserted >= 1);
//! ```
//!
//! # Modules
//!
//! - [`compliance`] - robots parsing, sources, and the per-run gate
//! - [`strategies`] - the closed strategy set and its backends
//! - [`extract`] - extraction specs and the HTML extractor
//! - [`healing`] - selector healing and the heuristic suggestion generator
//! - [`adapters`] - per-source URL building, specs, and normalization
//! - [`scheduler`] - batch runs, pacing, retry and escalation
//! - [`testing`] - mock implementations for tests

pub mod adapters;
pub mod aggregator;
pub mod compliance;
pub mod error;
pub mod extract;
pub mod healing;
pub mod parse;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod strategies;
pub mod testing;
pub mod types;

pub use adapters::{
    AttemptMetadata, CcassAdapter, DisclosureAdapter, FilingsAdapter, SourceAdapter,
    SourceRegistry, StatisticsAdapter,
};
pub use aggregator::ResultAggregator;
pub use compliance::{
    ComplianceDecision, ComplianceGate, CompliancePolicy, HttpRobotsSource, RobotsFetch,
    RobotsRules, RobotsSource, StaticRobotsSource,
};
pub use error::{
    EngineError, FailureReason, FetchError, SelectorMiss, StoreError, ValidationError,
};
pub use extract::{ExtractionSpec, Extractor, FieldRule, HtmlExtractor, RawFields, ValueShape};
pub use healing::{
    HealingResult, HealingSuggestion, HeuristicSuggestionGenerator, Reliability, SelectorHealer,
    SelectorHealingRequest, SuggestionGenerator,
};
pub use scheduler::{BatchScheduler, SchedulerConfig, DEFAULT_USER_AGENT};
pub use service::{RequestDetail, ScrapeInvocation, ScrapeResponse, ScrapeService};
pub use store::{MemoryRecordStore, RecordSink, UpsertCounts};
#[cfg(feature = "chromium")]
pub use strategies::ChromiumRenderer;
pub use strategies::{
    FetchConfig, FetchTarget, HeadlessRenderStrategy, HttpFetchStrategy, MockResponse,
    MockStrategy, PageRenderer, RenderingApiConfig, RenderingApiStrategy, Strategy, StrategySet,
};
pub use types::{
    BatchReport, DateRange, ExtractionAttempt, HealedSelector, NormalizedRecord, OutcomeKind,
    RecordData, RequestOptions, RequestOutcome, ScrapeRequest, StrategyKind,
};
