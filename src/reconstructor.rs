//! Session reconstruction state machine
//!
//! Walks one device's normalized event stream and emits bounded usage
//! sessions. Each app has a two-state machine (idle / open); the stream
//! drives every machine in a single pass. Identical input and configuration
//! always yield an identical session sequence: open sessions live in a
//! `BTreeMap` so multi-session closes happen in app-name order, and the
//! final sequence is sorted by start time.

use crate::config::FilterConfig;
use crate::filter;
use crate::types::{AnomalyFlag, InteractionType, RawEvent, TerminationReason, UsageSession};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

struct OpenSession {
    device_id: String,
    start_time: DateTime<Utc>,
    app_label: Option<String>,
    events: Vec<RawEvent>,
}

/// Per-device session reconstructor
pub struct Reconstructor;

impl Reconstructor {
    /// Reconstruct usage sessions from a normalized, single-device stream.
    ///
    /// Termination semantics:
    /// - a configured same-app stop event closes the app's session
    ///   (`ExplicitStopEvent`);
    /// - a start-type event closes the same app's prior session and any
    ///   other app's session it is configured to stop (`NextEventImplicit`:
    ///   the prior usage is assumed to have ended when the next began);
    /// - a configured non-start stop event closes other apps' sessions
    ///   (`ExplicitStopEvent`);
    /// - `DeviceShutdown` closes every open session (`DeviceShutdown` +
    ///   boundary flag) and takes precedence over any event sharing its
    ///   timestamp;
    /// - end of stream emits still-open sessions unterminated.
    pub fn reconstruct(events: &[RawEvent], config: &FilterConfig) -> Vec<UsageSession> {
        let mut state = ReconstructorState {
            config,
            open: BTreeMap::new(),
            closed: Vec::new(),
        };

        // Shutdown precedence is scoped to runs of equal timestamps: if a
        // run contains a shutdown, it is applied before the rest of the run.
        let mut start = 0;
        while start < events.len() {
            let mut end = start + 1;
            while end < events.len() && events[end].timestamp == events[start].timestamp {
                end += 1;
            }
            let run = &events[start..end];
            if let Some(shutdown) = run
                .iter()
                .find(|e| e.interaction_type == InteractionType::DeviceShutdown)
            {
                state.close_all(
                    shutdown.timestamp,
                    TerminationReason::DeviceShutdown,
                    Some(AnomalyFlag::DeviceShutdownBoundary),
                );
            }
            for event in run {
                if event.interaction_type == InteractionType::DeviceShutdown {
                    continue;
                }
                state.apply(event);
            }
            start = end;
        }

        // End of stream: emit still-open sessions unterminated, in app order.
        let open = std::mem::take(&mut state.open);
        for (app_package, open_session) in open {
            let session = state.into_session(
                app_package,
                open_session,
                None,
                TerminationReason::EndOfStreamUnterminated,
                None,
            );
            state.closed.push(session);
        }

        debug!(sessions = state.closed.len(), "reconstruction complete");

        let mut sessions = state.closed;
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.app_package.cmp(&b.app_package))
        });
        sessions
    }
}

struct ReconstructorState<'a> {
    config: &'a FilterConfig,
    open: BTreeMap<String, OpenSession>,
    closed: Vec<UsageSession>,
}

impl ReconstructorState<'_> {
    fn apply(&mut self, event: &RawEvent) {
        let ty = &event.interaction_type;

        if self.config.stops_other_apps(ty) {
            // The same semantics whether triggered by a start event or an
            // explicit stop event; only the recorded reason differs.
            let reason = if ty.is_session_start() {
                TerminationReason::NextEventImplicit
            } else {
                TerminationReason::ExplicitStopEvent
            };
            self.close_others(&event.app_package, event.timestamp, reason);
        }

        if ty.is_session_start() {
            if self.open.contains_key(&event.app_package) {
                self.close_app(
                    &event.app_package,
                    event.timestamp,
                    TerminationReason::NextEventImplicit,
                    None,
                );
            }
            self.open.insert(
                event.app_package.clone(),
                OpenSession {
                    device_id: event.device_id.clone(),
                    start_time: event.timestamp,
                    app_label: event.app_label.clone(),
                    events: Vec::new(),
                },
            );
            return;
        }

        if self.config.stops_same_app(ty) {
            self.close_app(
                &event.app_package,
                event.timestamp,
                TerminationReason::ExplicitStopEvent,
                None,
            );
            return;
        }

        // Irrelevant to session boundaries: record as an interior event of
        // the app's open session, if any.
        if let Some(open_session) = self.open.get_mut(&event.app_package) {
            open_session.events.push(event.clone());
        }
    }

    fn close_app(
        &mut self,
        app_package: &str,
        end: DateTime<Utc>,
        reason: TerminationReason,
        flag: Option<AnomalyFlag>,
    ) {
        if let Some(open_session) = self.open.remove(app_package) {
            let session =
                self.into_session(app_package.to_string(), open_session, Some(end), reason, flag);
            self.closed.push(session);
        }
    }

    fn close_others(&mut self, app_package: &str, end: DateTime<Utc>, reason: TerminationReason) {
        let others: Vec<String> = self
            .open
            .keys()
            .filter(|open_app| open_app.as_str() != app_package)
            .cloned()
            .collect();
        for other in others {
            self.close_app(&other, end, reason, None);
        }
    }

    fn close_all(&mut self, end: DateTime<Utc>, reason: TerminationReason, flag: Option<AnomalyFlag>) {
        let apps: Vec<String> = self.open.keys().cloned().collect();
        for app in apps {
            self.close_app(&app, end, reason, flag.clone());
        }
    }

    fn into_session(
        &self,
        app_package: String,
        open_session: OpenSession,
        end_time: Option<DateTime<Utc>>,
        termination_reason: TerminationReason,
        flag: Option<AnomalyFlag>,
    ) -> UsageSession {
        let class = filter::classify(&app_package, open_session.app_label.as_deref(), self.config);
        UsageSession {
            device_id: open_session.device_id,
            app_package,
            start_time: open_session.start_time,
            end_time,
            duration_seconds: None,
            is_filtered_app: class.is_filtered,
            label: class.label,
            termination_reason,
            flags: flag.into_iter().collect(),
            below_min_duration: false,
            preceding_gap_hours: None,
            events: open_session.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
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

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_foreground_background_pair_closes_explicitly() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(120, "com.app.a", InteractionType::MoveToBackground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].app_package, "com.app.a");
        assert_eq!(sessions[0].start_time, ts(0));
        assert_eq!(sessions[0].end_time, Some(ts(120)));
        assert_eq!(
            sessions[0].termination_reason,
            TerminationReason::ExplicitStopEvent
        );
    }

    #[test]
    fn test_other_app_foreground_closes_implicitly() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(50, "com.app.b", InteractionType::MoveToForeground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].app_package, "com.app.a");
        assert_eq!(sessions[0].end_time, Some(ts(50)));
        assert_eq!(
            sessions[0].termination_reason,
            TerminationReason::NextEventImplicit
        );
        assert_eq!(sessions[1].app_package, "com.app.b");
        assert_eq!(sessions[1].end_time, None);
        assert_eq!(
            sessions[1].termination_reason,
            TerminationReason::EndOfStreamUnterminated
        );
    }

    #[test]
    fn test_same_app_restart_closes_prior_implicitly() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(60, "com.app.a", InteractionType::MoveToForeground),
            event(90, "com.app.a", InteractionType::MoveToBackground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].end_time, Some(ts(60)));
        assert_eq!(
            sessions[0].termination_reason,
            TerminationReason::NextEventImplicit
        );
        assert_eq!(sessions[1].start_time, ts(60));
        assert_eq!(sessions[1].end_time, Some(ts(90)));
    }

    #[test]
    fn test_shutdown_closes_all_open_sessions() {
        let config = FilterConfig {
            // Keep foreground out of the cross-app stop set so two sessions
            // can be open at once.
            other_app_stop_types: std::collections::BTreeSet::from([
                InteractionType::DeviceShutdown,
            ]),
            ..Default::default()
        };
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(10, "com.app.b", InteractionType::MoveToForeground),
            event(100, "android", InteractionType::DeviceShutdown),
        ];
        let sessions = Reconstructor::reconstruct(&events, &config);

        assert_eq!(sessions.len(), 2);
        for session in &sessions {
            assert_eq!(session.end_time, Some(ts(100)));
            assert_eq!(session.termination_reason, TerminationReason::DeviceShutdown);
            assert_eq!(session.flags, vec![AnomalyFlag::DeviceShutdownBoundary]);
        }
    }

    #[test]
    fn test_shutdown_takes_precedence_over_stop_at_same_timestamp() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(100, "com.app.a", InteractionType::MoveToBackground),
            event(100, "android", InteractionType::DeviceShutdown),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].termination_reason, TerminationReason::DeviceShutdown);
        assert_eq!(sessions[0].flags, vec![AnomalyFlag::DeviceShutdownBoundary]);
    }

    #[test]
    fn test_screen_off_closes_other_apps() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(80, "android", InteractionType::ScreenNonInteractive),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].end_time, Some(ts(80)));
        assert_eq!(
            sessions[0].termination_reason,
            TerminationReason::ExplicitStopEvent
        );
    }

    #[test]
    fn test_neutral_events_recorded_as_interior() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(30, "com.app.a", InteractionType::UserInteraction),
            event(45, "com.app.a", InteractionType::ConfigurationChange),
            event(120, "com.app.a", InteractionType::MoveToBackground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        assert_eq!(sessions.len(), 1);
        let interior: Vec<_> = sessions[0]
            .events
            .iter()
            .map(|e| e.interaction_type.clone())
            .collect();
        assert_eq!(
            interior,
            vec![
                InteractionType::UserInteraction,
                InteractionType::ConfigurationChange,
            ]
        );
    }

    #[test]
    fn test_stop_without_open_session_is_ignored() {
        let events = vec![event(10, "com.app.a", InteractionType::MoveToBackground)];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_sessions_for_same_app_never_overlap() {
        let events = vec![
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(40, "com.app.a", InteractionType::MoveToForeground),
            event(70, "com.app.a", InteractionType::MoveToBackground),
            event(200, "com.app.a", InteractionType::MoveToForeground),
            event(260, "com.app.a", InteractionType::MoveToBackground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &FilterConfig::default());

        for pair in sessions.windows(2) {
            if pair[0].app_package == pair[1].app_package {
                assert!(pair[0].end_time.unwrap() <= pair[1].start_time);
            }
        }
    }

    #[test]
    fn test_filtered_app_labeled_at_reconstruction() {
        let config = FilterConfig {
            filtered_apps: std::collections::BTreeMap::from([(
                "com.android.settings".to_string(),
                "Settings".to_string(),
            )]),
            ..Default::default()
        };
        let mut open = event(0, "com.android.settings", InteractionType::MoveToForeground);
        open.app_label = Some("Settings".to_string());
        let events = vec![
            open,
            event(15, "com.android.settings", InteractionType::MoveToBackground),
        ];
        let sessions = Reconstructor::reconstruct(&events, &config);

        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_filtered_app);
        assert_eq!(sessions[0].label, "filtered");
    }

    #[test]
    fn test_deterministic_output_for_identical_input() {
        let events = vec![
            event(0, "com.app.b", InteractionType::MoveToForeground),
            event(0, "com.app.a", InteractionType::MoveToForeground),
            event(90, "android", InteractionType::ScreenNonInteractive),
        ];
        let config = FilterConfig {
            other_app_stop_types: std::collections::BTreeSet::from([
                InteractionType::ScreenNonInteractive,
            ]),
            ..Default::default()
        };
        let first = Reconstructor::reconstruct(&events, &config);
        let second = Reconstructor::reconstruct(&events, &config);
        assert_eq!(first, second);
    }
}
