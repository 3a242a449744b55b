//! Core types for the Sessionweave pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw interaction events, reconstructed usage sessions, anomaly
//! flags, and the denormalized output records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Android usage-event vocabulary recognized by the engine
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    MoveToForeground,
    MoveToBackground,
    ActivityStopped,
    ActivityDestroyed,
    ScreenInteractive,
    ScreenNonInteractive,
    KeyguardShown,
    KeyguardHidden,
    DeviceShutdown,
    DeviceStartup,
    UserUnlocked,
    UserStopped,
    ForegroundServiceStart,
    ForegroundServiceStop,
    NotificationSeen,
    NotificationInterruption,
    StandbyBucketChanged,
    ConfigurationChange,
    SystemInteraction,
    UserInteraction,
    FlushToDisk,
    /// For unknown/future interaction vocabulary
    #[serde(untagged)]
    Other(String),
}

impl InteractionType {
    pub fn as_str(&self) -> &str {
        match self {
            InteractionType::MoveToForeground => "move_to_foreground",
            InteractionType::MoveToBackground => "move_to_background",
            InteractionType::ActivityStopped => "activity_stopped",
            InteractionType::ActivityDestroyed => "activity_destroyed",
            InteractionType::ScreenInteractive => "screen_interactive",
            InteractionType::ScreenNonInteractive => "screen_non_interactive",
            InteractionType::KeyguardShown => "keyguard_shown",
            InteractionType::KeyguardHidden => "keyguard_hidden",
            InteractionType::DeviceShutdown => "device_shutdown",
            InteractionType::DeviceStartup => "device_startup",
            InteractionType::UserUnlocked => "user_unlocked",
            InteractionType::UserStopped => "user_stopped",
            InteractionType::ForegroundServiceStart => "foreground_service_start",
            InteractionType::ForegroundServiceStop => "foreground_service_stop",
            InteractionType::NotificationSeen => "notification_seen",
            InteractionType::NotificationInterruption => "notification_interruption",
            InteractionType::StandbyBucketChanged => "standby_bucket_changed",
            InteractionType::ConfigurationChange => "configuration_change",
            InteractionType::SystemInteraction => "system_interaction",
            InteractionType::UserInteraction => "user_interaction",
            InteractionType::FlushToDisk => "flush_to_disk",
            InteractionType::Other(name) => name.as_str(),
        }
    }

    /// Whether this event type opens a usage session
    pub fn is_session_start(&self) -> bool {
        matches!(self, InteractionType::MoveToForeground)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "move_to_foreground" => InteractionType::MoveToForeground,
            "move_to_background" => InteractionType::MoveToBackground,
            "activity_stopped" => InteractionType::ActivityStopped,
            "activity_destroyed" => InteractionType::ActivityDestroyed,
            "screen_interactive" => InteractionType::ScreenInteractive,
            "screen_non_interactive" => InteractionType::ScreenNonInteractive,
            "keyguard_shown" => InteractionType::KeyguardShown,
            "keyguard_hidden" => InteractionType::KeyguardHidden,
            "device_shutdown" => InteractionType::DeviceShutdown,
            "device_startup" => InteractionType::DeviceStartup,
            "user_unlocked" => InteractionType::UserUnlocked,
            "user_stopped" => InteractionType::UserStopped,
            "foreground_service_start" => InteractionType::ForegroundServiceStart,
            "foreground_service_stop" => InteractionType::ForegroundServiceStop,
            "notification_seen" => InteractionType::NotificationSeen,
            "notification_interruption" => InteractionType::NotificationInterruption,
            "standby_bucket_changed" => InteractionType::StandbyBucketChanged,
            "configuration_change" => InteractionType::ConfigurationChange,
            "system_interaction" => InteractionType::SystemInteraction,
            "user_interaction" => InteractionType::UserInteraction,
            "flush_to_disk" => InteractionType::FlushToDisk,
            other => InteractionType::Other(other.to_string()),
        })
    }
}

/// A single timestamped interaction event recorded on a device.
///
/// Created once by the upstream normalizer; never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Device (participant) identifier
    pub device_id: String,
    /// App package the event belongs to
    pub app_package: String,
    /// Human-readable application label, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_label: Option<String>,
    /// Absolute event instant (UTC)
    pub timestamp: DateTime<Utc>,
    /// Interaction type
    pub interaction_type: InteractionType,
    /// IANA zone the row was recorded in, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_timezone: Option<String>,
}

/// The rule that closed a usage session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A configured stop-type event closed the session
    ExplicitStopEvent,
    /// A new start event for the same app closed the prior session
    NextEventImplicit,
    /// A device shutdown closed the session
    DeviceShutdown,
    /// The stream ended while the session was still open
    EndOfStreamUnterminated,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::ExplicitStopEvent => "explicit_stop_event",
            TerminationReason::NextEventImplicit => "next_event_implicit",
            TerminationReason::DeviceShutdown => "device_shutdown",
            TerminationReason::EndOfStreamUnterminated => "end_of_stream_unterminated",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explicit_stop_event" => Ok(TerminationReason::ExplicitStopEvent),
            "next_event_implicit" => Ok(TerminationReason::NextEventImplicit),
            "device_shutdown" => Ok(TerminationReason::DeviceShutdown),
            "end_of_stream_unterminated" => Ok(TerminationReason::EndOfStreamUnterminated),
            other => Err(format!("unknown termination reason: {other}")),
        }
    }
}

/// Anomaly tag attached to a session or to the gap preceding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFlag {
    /// Session duration met a configured hour threshold
    LongDuration { threshold_hours: u32 },
    /// The idle interval before this session met a configured hour threshold
    DataGap { threshold_hours: u32 },
    /// Session was closed by, or directly precedes, a device shutdown
    DeviceShutdownBoundary,
    /// Session is the first after a device startup
    DeviceStartupBoundary,
}

impl fmt::Display for AnomalyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyFlag::LongDuration { threshold_hours } => {
                write!(f, ">{threshold_hours}-HR APP USAGE")
            }
            AnomalyFlag::DataGap { threshold_hours } => {
                write!(f, ">{threshold_hours}-HR TIME GAP")
            }
            AnomalyFlag::DeviceShutdownBoundary => f.write_str("DEVICE SHUTDOWN"),
            AnomalyFlag::DeviceStartupBoundary => f.write_str("DEVICE STARTUP"),
        }
    }
}

impl FromStr for AnomalyFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEVICE SHUTDOWN" => return Ok(AnomalyFlag::DeviceShutdownBoundary),
            "DEVICE STARTUP" => return Ok(AnomalyFlag::DeviceStartupBoundary),
            _ => {}
        }
        let parse_threshold = |suffix: &str| -> Option<u32> {
            s.strip_prefix('>')
                .and_then(|rest| rest.strip_suffix(suffix))
                .and_then(|hours| hours.parse().ok())
        };
        if let Some(threshold_hours) = parse_threshold("-HR APP USAGE") {
            return Ok(AnomalyFlag::LongDuration { threshold_hours });
        }
        if let Some(threshold_hours) = parse_threshold("-HR TIME GAP") {
            return Ok(AnomalyFlag::DataGap { threshold_hours });
        }
        Err(format!("unknown anomaly flag: {s}"))
    }
}

/// A bounded interval during which one app was in use on a device.
///
/// Produced by the reconstructor; enriched in place by the duration and
/// anomaly stages. Sessions never share mutable state with one another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSession {
    pub device_id: String,
    pub app_package: String,
    pub start_time: DateTime<Utc>,
    /// None when the stream ended with the session still open
    pub end_time: Option<DateTime<Utc>>,
    /// None until estimated; stays None for unterminated sessions under the
    /// `Unknown` fallback policy
    pub duration_seconds: Option<f64>,
    pub is_filtered_app: bool,
    pub label: String,
    pub termination_reason: TerminationReason,
    pub flags: Vec<AnomalyFlag>,
    /// Marked for exclusion at assembly; duration is retained for traceability
    pub below_min_duration: bool,
    /// Idle interval between the previous session on this device and this one
    pub preceding_gap_hours: Option<f64>,
    /// Non-boundary events observed while the session was open
    pub events: Vec<RawEvent>,
}

/// One denormalized output row per retained session.
///
/// Timestamps are presentation strings in the configured target zone (or
/// zone-naive when stripping is configured); all interval math happened
/// upstream in absolute time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub device_id: String,
    pub app_package: String,
    pub app_label: String,
    pub is_filtered_app: bool,
    pub start_time: String,
    /// Empty when the session was unterminated at stream end
    pub end_time: String,
    pub duration_seconds: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub termination_reason: TerminationReason,
    pub flags: Vec<AnomalyFlag>,
    pub preceding_gap_hours: f64,
    /// Sessions of this app in the run
    pub app_session_count: u32,
    /// 1 = longest session of this app; ties broken by start time
    pub duration_rank: u32,
    pub any_app_new_engage_30s: bool,
    pub any_app_new_engage_custom: bool,
    pub any_app_switched_app: bool,
    pub any_app_usage_time_gap_hours: f64,
    pub valid_app_new_engage_30s: bool,
    pub valid_app_new_engage_custom: bool,
    pub valid_app_switched_app: bool,
    pub valid_app_usage_time_gap_hours: f64,
}

/// A recoverable anomaly recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub device_id: String,
    pub app_package: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the rule that raised the diagnostic
    pub rule: String,
    pub message: String,
}

/// Provenance and counts for one processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub engine_version: String,
    pub processed_at: DateTime<Utc>,
    pub device_id: String,
    pub events_in: u32,
    pub sessions_reconstructed: u32,
    pub sessions_retained: u32,
    pub sessions_below_min_duration: u32,
    pub sessions_negative_duration: u32,
    pub diagnostics: Vec<Diagnostic>,
}

/// Complete output of one per-device run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRun {
    /// Final assembled records, ordered by device, app, start time
    pub records: Vec<SessionRecord>,
    /// Interior per-event detail rows that survived the removal filter
    pub detail_events: Vec<RawEvent>,
    /// Every reconstructed session, before minimum-duration exclusion
    pub sessions: Vec<UsageSession>,
    pub summary: RunSummary,
}
