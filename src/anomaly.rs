//! Anomaly flagging
//!
//! Runs after reconstruction over the whole device timeline (across apps):
//! long-running sessions, data gaps between consecutive sessions, and
//! device shutdown/startup boundaries. Flags are additive and never remove
//! a session from output. A gap bounded by shutdown/startup events is a
//! device-off period, not missing data, so it is exempt from the gap flag
//! even beyond the threshold.

use crate::config::FilterConfig;
use crate::types::{AnomalyFlag, InteractionType, RawEvent, UsageSession};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Anomaly flagging engine
pub struct AnomalyFlagger;

impl AnomalyFlagger {
    /// Flag sessions in place. `sessions` must be in chronological
    /// start-time order (the reconstructor's output order); `events` is the
    /// normalized stream the sessions were built from, used to locate
    /// shutdown/startup boundaries.
    pub fn flag(sessions: &mut [UsageSession], events: &[RawEvent], config: &FilterConfig) {
        let shutdowns: Vec<DateTime<Utc>> = boundary_timestamps(events, InteractionType::DeviceShutdown);
        let startups: Vec<DateTime<Utc>> = boundary_timestamps(events, InteractionType::DeviceStartup);

        for session in sessions.iter_mut() {
            if let Some(duration) = session.duration_seconds {
                let hours = duration / 3600.0;
                if let Some(threshold) = highest_met(&config.long_duration_threshold_hours, hours) {
                    session.flags.push(AnomalyFlag::LongDuration {
                        threshold_hours: threshold,
                    });
                }
            }
        }

        // Gap scan across apps: each session's idle interval runs from the
        // latest end seen so far to its own start.
        let mut latest_end: Option<(DateTime<Utc>, usize)> = None;
        for index in 0..sessions.len() {
            if let Some((prev_end, prev_index)) = latest_end {
                let start = sessions[index].start_time;
                let gap_hours = (start - prev_end).num_milliseconds().max(0) as f64 / 3_600_000.0;
                sessions[index].preceding_gap_hours = Some(round2(gap_hours));

                let shutdown_bounded = within(&shutdowns, prev_end, start);
                let startup_bounded = within(&startups, prev_end, start);

                if startup_bounded {
                    push_unique(&mut sessions[index].flags, AnomalyFlag::DeviceStartupBoundary);
                }
                if shutdown_bounded {
                    push_unique(
                        &mut sessions[prev_index].flags,
                        AnomalyFlag::DeviceShutdownBoundary,
                    );
                }

                if !shutdown_bounded && !startup_bounded {
                    if let Some(threshold) = highest_met(&config.gap_threshold_hours, gap_hours) {
                        sessions[index].flags.push(AnomalyFlag::DataGap {
                            threshold_hours: threshold,
                        });
                    }
                }
            }

            if let Some(end) = sessions[index].end_time {
                if latest_end.map_or(true, |(prev_end, _)| end > prev_end) {
                    latest_end = Some((end, index));
                }
            }
        }

        debug!(sessions = sessions.len(), "anomaly flagging complete");
    }
}

fn boundary_timestamps(events: &[RawEvent], interaction_type: InteractionType) -> Vec<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.interaction_type == interaction_type)
        .map(|e| e.timestamp)
        .collect()
}

/// Highest threshold the value meets, scanning descending
fn highest_met(thresholds: &[u32], hours: f64) -> Option<u32> {
    thresholds
        .iter()
        .rev()
        .find(|&&threshold| hours >= threshold as f64)
        .copied()
}

fn within(timestamps: &[DateTime<Utc>], from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    timestamps.iter().any(|&ts| ts >= from && ts <= to)
}

fn push_unique(flags: &mut Vec<AnomalyFlag>, flag: AnomalyFlag) {
    if !flags.contains(&flag) {
        flags.push(flag);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
