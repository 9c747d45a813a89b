pub mod models;
pub mod error;
pub mod config;
pub mod detector;
pub mod dedup;
pub mod aggregator;
pub mod dispatcher;
pub mod state;
pub mod engine;
pub mod scope;
pub mod hunter;
pub mod traffic;
pub mod reporting;

// Re-export commonly used items
pub use models::*;
pub use error::*;
pub use config::HunterConfig;
pub use detector::{detect, Detection, VersionSegment, VERSION_PLACEHOLDER};
pub use dedup::EndpointDeduplicator;
pub use aggregator::{AggregatorSnapshot, HostResults, RecordStatus, ResultAggregator, ResultEvent, SweepTicket};
pub use dispatcher::{FuzzDispatcher, SweepPlan, SweepSummary};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use engine::ReplayEngine;
pub use scope::{AllowAll, HostScope, ScopeFilter};
pub use hunter::{Observation, VersionHunter};
pub use traffic::{HarParser, RawRequestParser, TrafficParser};
pub use reporting::{export_csv, export_markdown};
