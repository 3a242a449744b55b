//! Per-run engine configuration
//!
//! A single immutable [`FilterConfig`] value is supplied per run and validated
//! before any event is processed. The engine holds no ambient settings: every
//! threshold and rule set lives here.

use crate::error::EngineError;
use crate::types::InteractionType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How output timestamps are rendered.
///
/// Presentation only: interval arithmetic always runs in absolute time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneMode {
    /// RFC3339 in UTC
    Utc,
    /// RFC3339 converted to the given IANA zone
    Convert(chrono_tz::Tz),
    /// Zone-naive local rendering (offset dropped after conversion to UTC)
    Strip,
}

/// Duration policy for sessions left open at stream end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationFallback {
    /// Leave the duration unknown (null)
    Unknown,
    /// Assign a fixed minimal engagement estimate, in seconds
    FixedSeconds(f64),
}

/// Immutable per-run configuration.
///
/// All fields are explicit; [`FilterConfig::default`] documents the baseline
/// rule sets but callers own the final values. Validation fails fast before
/// any event is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum duration (seconds) for a session to be retained in output
    pub min_duration_seconds: f64,
    /// App packages labeled as filtered, mapped to their expected label(s)
    /// (comma-separated). Matching is exact and case-sensitive.
    pub filtered_apps: BTreeMap<String, String>,
    /// Same-app event types that close an open session
    pub same_app_stop_types: BTreeSet<InteractionType>,
    /// Event types that close open sessions of *other* apps
    pub other_app_stop_types: BTreeSet<InteractionType>,
    /// Interaction types removed from interior detail rows at assembly
    pub output_removed_types: BTreeSet<InteractionType>,
    /// Ascending hour thresholds for long-usage flagging; highest met wins
    pub long_duration_threshold_hours: Vec<u32>,
    /// Ascending hour thresholds for data-gap flagging; highest met wins
    pub gap_threshold_hours: Vec<u32>,
    /// Output timestamp rendering
    pub timezone: TimezoneMode,
    /// Duration policy for sessions unterminated at stream end
    pub unterminated_duration: DurationFallback,
    /// Gap (seconds) above which a session counts as a new engagement for the
    /// configurable engagement column
    pub engagement_gap_seconds: f64,
    /// Reorder runs of equal timestamps so stop-type events are applied
    /// before neutral events, and neutral before foreground events
    pub reorder_equal_timestamps: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_duration_seconds: 0.0,
            filtered_apps: BTreeMap::new(),
            same_app_stop_types: BTreeSet::from([
                InteractionType::MoveToBackground,
                InteractionType::ActivityStopped,
                InteractionType::ActivityDestroyed,
            ]),
            other_app_stop_types: BTreeSet::from([
                InteractionType::MoveToForeground,
                InteractionType::ScreenNonInteractive,
                InteractionType::KeyguardShown,
                InteractionType::ActivityDestroyed,
                InteractionType::DeviceShutdown,
                InteractionType::UserStopped,
            ]),
            output_removed_types: BTreeSet::from([
                InteractionType::ConfigurationChange,
                InteractionType::SystemInteraction,
                InteractionType::NotificationSeen,
                InteractionType::StandbyBucketChanged,
                InteractionType::FlushToDisk,
            ]),
            long_duration_threshold_hours: vec![1, 6, 12, 24],
            gap_threshold_hours: vec![1, 6, 12, 24],
            timezone: TimezoneMode::Utc,
            unterminated_duration: DurationFallback::Unknown,
            engagement_gap_seconds: 300.0,
            reorder_equal_timestamps: true,
        }
    }
}

impl FilterConfig {
    /// Validate the configuration, before any event is processed.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.min_duration_seconds.is_finite() || self.min_duration_seconds < 0.0 {
            return Err(EngineError::Configuration(format!(
                "min_duration_seconds must be finite and non-negative, got {}",
                self.min_duration_seconds
            )));
        }
        if !self.engagement_gap_seconds.is_finite() || self.engagement_gap_seconds < 0.0 {
            return Err(EngineError::Configuration(format!(
                "engagement_gap_seconds must be finite and non-negative, got {}",
                self.engagement_gap_seconds
            )));
        }
        if let DurationFallback::FixedSeconds(secs) = self.unterminated_duration {
            if !secs.is_finite() || secs < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "unterminated_duration fixed estimate must be finite and non-negative, got {secs}"
                )));
            }
        }
        Self::validate_thresholds("long_duration_threshold_hours", &self.long_duration_threshold_hours)?;
        Self::validate_thresholds("gap_threshold_hours", &self.gap_threshold_hours)?;
        Ok(())
    }

    fn validate_thresholds(name: &str, thresholds: &[u32]) -> Result<(), EngineError> {
        if thresholds.is_empty() {
            return Err(EngineError::Configuration(format!("{name} must not be empty")));
        }
        if thresholds.contains(&0) {
            return Err(EngineError::Configuration(format!(
                "{name} thresholds must be positive"
            )));
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EngineError::Configuration(format!(
                "{name} must be strictly ascending, got {thresholds:?}"
            )));
        }
        Ok(())
    }

    /// Whether an event type closes an open session of the same app
    pub fn stops_same_app(&self, interaction_type: &InteractionType) -> bool {
        self.same_app_stop_types.contains(interaction_type)
    }

    /// Whether an event type closes open sessions of other apps
    pub fn stops_other_apps(&self, interaction_type: &InteractionType) -> bool {
        self.other_app_stop_types.contains(interaction_type)
    }
}
