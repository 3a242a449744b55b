//! Pipeline orchestration
//!
//! This module provides the public API for Sessionweave. It wires the full
//! pipeline from a normalized event stream to assembled output records.

use crate::anomaly::AnomalyFlagger;
use crate::assembler::OutputAssembler;
use crate::config::FilterConfig;
use crate::duration::DurationEstimator;
use crate::error::EngineError;
use crate::normalizer::Normalizer;
use crate::reconstructor::Reconstructor;
use crate::types::{DeviceRun, RawEvent, RunSummary};
use chrono::Utc;
use uuid::Uuid;

/// Reconstruct usage sessions for one device's event stream.
///
/// Pipeline stages:
/// 1. Configuration validation (fails before any event is touched)
/// 2. Input-contract enforcement and equal-timestamp ordering
/// 3. Session reconstruction (per-app state machines)
/// 4. Duration estimation and minimum-duration marking
/// 5. Anomaly flagging over the device timeline
/// 6. Output assembly (exclusion, presentation, helper columns)
///
/// A run either completes with the full session set or fails outright;
/// there is no partial-results contract. Runs share no state, so callers
/// may process independent devices in parallel with separate calls.
///
/// # Example
/// ```ignore
/// let run = reconstruct_device_stream(&events, &FilterConfig::default())?;
/// ```
pub fn reconstruct_device_stream(
    events: &[RawEvent],
    config: &FilterConfig,
) -> Result<DeviceRun, EngineError> {
    // Stage 1: Validate configuration
    config.validate()?;

    // Stage 2: Enforce the input contract
    let normalized = Normalizer::normalize(events, config)?;

    // Stage 3: Reconstruct sessions
    let sessions = Reconstructor::reconstruct(&normalized, config);
    let sessions_reconstructed = sessions.len() as u32;

    // Stage 4: Estimate durations
    let (mut sessions, diagnostics) = DurationEstimator::estimate(sessions, config);
    let sessions_negative_duration = diagnostics.len() as u32;

    // Stage 5: Flag anomalies
    AnomalyFlagger::flag(&mut sessions, &normalized, config);

    // Stage 6: Assemble output
    let (records, detail_events) = OutputAssembler::assemble(&sessions, config);

    let sessions_below_min_duration = sessions
        .iter()
        .filter(|session| session.below_min_duration)
        .count() as u32;

    let summary = RunSummary {
        run_id: Uuid::new_v4(),
        engine_version: crate::ENGINE_VERSION.to_string(),
        processed_at: Utc::now(),
        device_id: normalized
            .first()
            .map(|event| event.device_id.clone())
            .unwrap_or_default(),
        events_in: normalized.len() as u32,
        sessions_reconstructed,
        sessions_retained: records.len() as u32,
        sessions_below_min_duration,
        sessions_negative_duration,
        diagnostics,
    };

    Ok(DeviceRun {
        records,
        detail_events,
        sessions,
        summary,
    })
}

/// Config-holding engine for repeated per-device runs.
///
/// Validates the configuration once at construction; each [`process`] call
/// is an independent, stateless run. Instances share nothing, so one engine
/// per device may run in parallel.
///
/// [`process`]: SessionEngine::process
pub struct SessionEngine {
    config: FilterConfig,
}

impl SessionEngine {
    /// Create an engine with a validated configuration
    pub fn new(config: FilterConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Process one device's event stream
    pub fn process(&self, events: &[RawEvent]) -> Result<DeviceRun, EngineError> {
        reconstruct_device_stream(events, &self.config)
    }

    /// The engine's configuration
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}
