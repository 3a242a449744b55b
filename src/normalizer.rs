//! Input-contract enforcement
//!
//! The upstream event normalizer is an external collaborator that promises an
//! ordered, single-device stream of well-formed events. This module checks
//! that promise on entry and applies the deterministic equal-timestamp
//! ordering rule, so every later stage can rely on the contract.

use crate::config::FilterConfig;
use crate::error::EngineError;
use crate::types::{InteractionType, RawEvent};
use chrono::Duration;
use tracing::debug;

/// Maximum tolerated backwards timestamp skew before the stream is rejected
/// as malformed. Regressions within the tolerance are re-sorted stably.
const OUT_OF_ORDER_TOLERANCE_MS: i64 = 1_000;

/// Validator/normalizer for incoming device streams
pub struct Normalizer;

impl Normalizer {
    /// Validate the input contract and return the normalized event sequence.
    ///
    /// Checks required fields, single-device streams, and timestamp
    /// monotonicity (within [`OUT_OF_ORDER_TOLERANCE_MS`]). Duplicate
    /// timestamps are legal; ties keep input order unless
    /// `reorder_equal_timestamps` is configured, in which case each run of
    /// equal timestamps is reordered so stop-type events apply before
    /// neutral events and neutral before foreground events.
    pub fn normalize(
        events: &[RawEvent],
        config: &FilterConfig,
    ) -> Result<Vec<RawEvent>, EngineError> {
        let mut normalized: Vec<RawEvent> = Vec::with_capacity(events.len());
        let tolerance = Duration::milliseconds(OUT_OF_ORDER_TOLERANCE_MS);

        let mut device_id: Option<&str> = None;
        let mut max_seen: Option<chrono::DateTime<chrono::Utc>> = None;

        for event in events {
            if event.device_id.is_empty() {
                return Err(malformed(event, "missing device id"));
            }
            if event.app_package.is_empty() {
                return Err(malformed(event, "missing app package"));
            }
            match device_id {
                None => device_id = Some(&event.device_id),
                Some(expected) if expected != event.device_id => {
                    return Err(malformed(
                        event,
                        &format!("stream mixes devices ({expected} and {})", event.device_id),
                    ));
                }
                Some(_) => {}
            }
            if let Some(max_seen) = max_seen {
                if event.timestamp + tolerance < max_seen {
                    return Err(malformed(
                        event,
                        &format!(
                            "timestamp regresses beyond the {OUT_OF_ORDER_TOLERANCE_MS}ms tolerance (latest seen: {max_seen})"
                        ),
                    ));
                }
            }
            max_seen = Some(match max_seen {
                Some(latest) => latest.max(event.timestamp),
                None => event.timestamp,
            });
            normalized.push(event.clone());
        }

        // Restore non-decreasing order for regressions within the tolerance.
        normalized.sort_by_key(|event| event.timestamp);

        if config.reorder_equal_timestamps {
            reorder_equal_runs(&mut normalized, config);
        }

        debug!(events = normalized.len(), "input contract validated");
        Ok(normalized)
    }
}

fn malformed(event: &RawEvent, reason: &str) -> EngineError {
    EngineError::MalformedEvent {
        device_id: event.device_id.clone(),
        app_package: event.app_package.clone(),
        timestamp: event.timestamp,
        reason: reason.to_string(),
    }
}

/// Application priority within a run of equal timestamps: stops first,
/// neutral events next, foreground events last, so a stop at `T` closes the
/// old session before a start at `T` opens the next one.
fn equal_run_priority(interaction_type: &InteractionType, config: &FilterConfig) -> u8 {
    if interaction_type.is_session_start() {
        2
    } else if config.stops_same_app(interaction_type) || config.stops_other_apps(interaction_type) {
        0
    } else {
        1
    }
}

fn reorder_equal_runs(events: &mut [RawEvent], config: &FilterConfig) {
    let mut start = 0;
    while start < events.len() {
        let mut end = start + 1;
        while end < events.len() && events[end].timestamp == events[start].timestamp {
            end += 1;
        }
        if end - start > 1 {
            events[start..end]
                .sort_by_key(|event| equal_run_priority(&event.interaction_type, config));
        }
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn event(secs: i64, app: &str, interaction_type: InteractionType) -> RawEvent {
        RawEvent {
            device_id: "device-1".to_string(),
            app_package: app.to_string(),
            app_label: None,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            interaction_type,
            event_timezone: None,
        }
    }

    #[test]
    fn test_ordered_stream_passes() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(10, "com.app.a", InteractionType::MoveToBackground),
        ];
        let normalized = Normalizer::normalize(&events, &FilterConfig::default()).unwrap();
        assert_eq!(normalized, events);
    }

    #[test]
    fn test_regression_beyond_tolerance_rejected() {
        let events = vec![
            event(100, "com.app.a", InteractionType::MoveToForeground),
            event(50, "com.app.a", InteractionType::MoveToBackground),
        ];
        let err = Normalizer::normalize(&events, &FilterConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedEvent { .. }));
        assert!(err.to_string().contains("regresses"));
    }

    #[test]
    fn test_regression_within_tolerance_is_resorted() {
        let mut late = event(10, "com.app.a", InteractionType::MoveToForeground);
        late.timestamp = Utc.timestamp_millis_opt(10_500).unwrap();
        let events = vec![
            event(11, "com.app.b", InteractionType::MoveToForeground),
            late.clone(),
        ];
        let normalized = Normalizer::normalize(&events, &FilterConfig::default()).unwrap();
        assert_eq!(normalized[0], late);
    }

    #[test]
    fn test_missing_device_id_rejected() {
        let mut bad = event(0, "com.app.a", InteractionType::MoveToForeground);
        bad.device_id = String::new();
        let err = Normalizer::normalize(&[bad], &FilterConfig::default()).unwrap_err();
        assert!(err.to_string().contains("missing device id"));
    }

    #[test]
    fn test_mixed_devices_rejected() {
        let mut other = event(10, "com.app.a", InteractionType::MoveToBackground);
        other.device_id = "device-2".to_string();
        let events = vec![event(0, "com.app.a", InteractionType::MoveToForeground), other];
        let err = Normalizer::normalize(&events, &FilterConfig::default()).unwrap_err();
        assert!(err.to_string().contains("mixes devices"));
    }

    #[test]
    fn test_equal_timestamps_put_stops_before_starts() {
        let events = vec![
            event(10, "com.app.a", InteractionType::MoveToForeground),
            event(10, "com.app.a", InteractionType::MoveToBackground),
            event(10, "com.app.a", InteractionType::NotificationSeen),
        ];
        let normalized = Normalizer::normalize(&events, &FilterConfig::default()).unwrap();
        let order: Vec<_> = normalized.iter().map(|e| e.interaction_type.clone()).collect();
        assert_eq!(
            order,
            vec![
                InteractionType::MoveToBackground,
                InteractionType::NotificationSeen,
                InteractionType::MoveToForeground,
            ]
        );
    }

    #[test]
    fn test_equal_timestamps_keep_input_order_when_disabled() {
        let config = FilterConfig {
            reorder_equal_timestamps: false,
            ..Default::default()
        };
        let events = vec![
            event(10, "com.app.a", InteractionType::MoveToForeground),
            event(10, "com.app.a", InteractionType::MoveToBackground),
        ];
        let normalized = Normalizer::normalize(&events, &config).unwrap();
        assert_eq!(normalized, events);
    }

    #[test]
    fn test_empty_stream_is_allowed() {
        let normalized = Normalizer::normalize(&[], &FilterConfig::default()).unwrap();
        assert!(normalized.is_empty());
    }
}
