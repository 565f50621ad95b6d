//! Data types shared by the engine components.

pub mod attempt;
pub mod record;
pub mod report;
pub mod request;

pub use attempt::{AttemptOutcome, AttemptPurpose, ExtractionAttempt};
pub use record::{
    DisclosureNotice, DisclosureRecord, FilingRecord, FilingType, Holding, HoldingsRecord,
    NormalizedRecord, Observation, Provenance, RecordData, RecordRow, StatisticsRecord,
};
pub use report::{BatchReport, HealedSelector, OutcomeKind, RequestOutcome};
pub use request::{DateRange, RequestOptions, ScrapeRequest, StrategyKind};
