//! Sessionweave - Deterministic session-reconstruction engine for Android
//! app-usage event streams
//!
//! Sessionweave transforms a per-device stream of timestamped interaction
//! events into validated usage sessions through a deterministic pipeline:
//! input-contract enforcement → session reconstruction → duration
//! estimation → anomaly flagging → output assembly.
//!
//! ## Modules
//!
//! - **Reconstruction core**: per-app state machines turning events into
//!   bounded sessions with explicit termination rules
//! - **Schema**: raw-event ingest (NDJSON/JSON/CSV) and lossless tabular
//!   export of the assembled records

pub mod anomaly;
pub mod assembler;
pub mod config;
pub mod duration;
pub mod error;
pub mod filter;
pub mod normalizer;
pub mod pipeline;
pub mod reconstructor;
pub mod schema;
pub mod types;

pub use config::{DurationFallback, FilterConfig, TimezoneMode};
pub use error::EngineError;
pub use pipeline::{reconstruct_device_stream, SessionEngine};

// Schema exports
pub use schema::{RawEventAdapter, RecordWriter};

// Core type exports
pub use types::{
    AnomalyFlag, DeviceRun, Diagnostic, InteractionType, RawEvent, RunSummary, SessionRecord,
    TerminationReason, UsageSession,
};

/// Engine version stamped into every run summary
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run provenance
pub const PRODUCER_NAME: &str = "sessionweave";
