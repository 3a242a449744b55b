//! Duration estimation
//!
//! Computes session durations and applies the minimum-duration retention
//! rule. Two sub-policies apply: sessions with both bounds get the exact
//! interval; sessions unterminated at stream end get the configured
//! fallback. A negative interval is a malformed-input anomaly handled
//! locally: the session is excluded with a loud diagnostic so unrelated
//! sessions keep flowing.

use crate::config::{DurationFallback, FilterConfig};
use crate::error::EngineError;
use crate::types::{Diagnostic, UsageSession};
use tracing::warn;

/// Rule name recorded on negative-duration diagnostics
pub const NEGATIVE_DURATION_RULE: &str = "negative_duration";

/// Duration estimator for reconstructed sessions
pub struct DurationEstimator;

impl DurationEstimator {
    /// Estimate durations, mark below-minimum sessions, and exclude
    /// negative-duration sessions.
    ///
    /// Below-minimum sessions keep their computed duration for traceability;
    /// only the exclusion marker is set. Returns the surviving sessions and
    /// the diagnostics for excluded ones.
    pub fn estimate(
        sessions: Vec<UsageSession>,
        config: &FilterConfig,
    ) -> (Vec<UsageSession>, Vec<Diagnostic>) {
        let mut surviving = Vec::with_capacity(sessions.len());
        let mut diagnostics = Vec::new();

        for mut session in sessions {
            match session.end_time {
                Some(end_time) => {
                    let duration =
                        (end_time - session.start_time).num_milliseconds() as f64 / 1000.0;
                    if duration < 0.0 {
                        warn!(
                            device_id = session.device_id,
                            app_package = session.app_package,
                            start = %session.start_time,
                            end = %end_time,
                            "excluding session with negative duration"
                        );
                        let error = EngineError::NegativeDuration {
                            device_id: session.device_id.clone(),
                            app_package: session.app_package.clone(),
                            start: session.start_time,
                            end: end_time,
                        };
                        diagnostics.push(Diagnostic {
                            device_id: session.device_id.clone(),
                            app_package: session.app_package.clone(),
                            timestamp: session.start_time,
                            rule: NEGATIVE_DURATION_RULE.to_string(),
                            message: format!("{error}; session excluded"),
                        });
                        continue;
                    }
                    session.duration_seconds = Some(duration);
                }
                None => {
                    session.duration_seconds = match config.unterminated_duration {
                        DurationFallback::Unknown => None,
                        DurationFallback::FixedSeconds(estimate) => Some(estimate),
                    };
                }
            }

            session.below_min_duration = session
                .duration_seconds
                .is_some_and(|duration| duration < config.min_duration_seconds);
            surviving.push(session);
        }

        (surviving, diagnostics)
    }
}
