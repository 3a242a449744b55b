//! Output assembly
//!
//! Merges reconstruction, labeling, duration, and flag results into the
//! final denormalized records: applies the minimum-duration exclusion and
//! the interaction-type removal filter for interior detail rows, renders
//! timestamps in the configured presentation zone, and derives the
//! sort/filter helper columns. Interval logic is already settled in
//! absolute time by the earlier stages; everything here is a projection.

use crate::config::{FilterConfig, TimezoneMode};
use crate::types::{RawEvent, SessionRecord, UsageSession};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Gap (seconds) above which a session counts as a new engagement for the
/// fixed engagement column
const NEW_ENGAGEMENT_GAP_SECONDS: f64 = 30.0;

/// Final-stage assembler
pub struct OutputAssembler;

impl OutputAssembler {
    /// Assemble output records and detail rows from flagged sessions.
    ///
    /// Sessions marked below the minimum duration are excluded here (and
    /// only here); anomaly flags never exclude. Returns records ordered by
    /// device, app, start time, plus the interior detail events that
    /// survived the removal filter, in chronological order.
    pub fn assemble(
        sessions: &[UsageSession],
        config: &FilterConfig,
    ) -> (Vec<SessionRecord>, Vec<RawEvent>) {
        // Work chronologically (the reconstructor's order) so engagement
        // columns see sessions in timeline order.
        let mut retained: Vec<&UsageSession> = sessions
            .iter()
            .filter(|session| !session.below_min_duration)
            .collect();
        retained.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.app_package.cmp(&b.app_package))
        });

        let engagement = compute_engagement(&retained, config);
        let (counts, ranks) = compute_app_rankings(&retained);

        let mut records: Vec<SessionRecord> = retained
            .iter()
            .enumerate()
            .map(|(index, session)| SessionRecord {
                device_id: session.device_id.clone(),
                app_package: session.app_package.clone(),
                app_label: session.label.clone(),
                is_filtered_app: session.is_filtered_app,
                start_time: render_timestamp(session.start_time, &config.timezone),
                end_time: session
                    .end_time
                    .map(|end| render_timestamp(end, &config.timezone))
                    .unwrap_or_default(),
                duration_seconds: session.duration_seconds,
                duration_minutes: session.duration_seconds.map(|secs| secs / 60.0),
                termination_reason: session.termination_reason,
                flags: session.flags.clone(),
                preceding_gap_hours: session.preceding_gap_hours.unwrap_or(0.0),
                app_session_count: counts[index],
                duration_rank: ranks[index],
                any_app_new_engage_30s: engagement[index].any_new_engage_30s,
                any_app_new_engage_custom: engagement[index].any_new_engage_custom,
                any_app_switched_app: engagement[index].any_switched_app,
                any_app_usage_time_gap_hours: engagement[index].any_time_gap_hours,
                valid_app_new_engage_30s: engagement[index].valid_new_engage_30s,
                valid_app_new_engage_custom: engagement[index].valid_new_engage_custom,
                valid_app_switched_app: engagement[index].valid_switched_app,
                valid_app_usage_time_gap_hours: engagement[index].valid_time_gap_hours,
            })
            .collect();

        let mut detail_events: Vec<RawEvent> = retained
            .iter()
            .flat_map(|session| session.events.iter())
            .filter(|event| !config.output_removed_types.contains(&event.interaction_type))
            .cloned()
            .collect();
        detail_events.sort_by_key(|event| event.timestamp);

        records.sort_by(|a, b| {
            a.device_id
                .cmp(&b.device_id)
                .then_with(|| a.app_package.cmp(&b.app_package))
                .then_with(|| a.start_time.cmp(&b.start_time))
        });

        debug!(
            records = records.len(),
            detail_events = detail_events.len(),
            "output assembled"
        );
        (records, detail_events)
    }
}

fn render_timestamp(timestamp: DateTime<Utc>, mode: &TimezoneMode) -> String {
    match mode {
        TimezoneMode::Utc => timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        TimezoneMode::Convert(tz) => timestamp
            .with_timezone(tz)
            .to_rfc3339_opts(SecondsFormat::Millis, false),
        TimezoneMode::Strip => timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EngagementColumns {
    any_new_engage_30s: bool,
    any_new_engage_custom: bool,
    any_switched_app: bool,
    any_time_gap_hours: f64,
    valid_new_engage_30s: bool,
    valid_new_engage_custom: bool,
    valid_switched_app: bool,
    valid_time_gap_hours: f64,
}

/// Engagement columns per retained session, in chronological order.
///
/// The `any_*` family compares each session to the previous bounded session
/// of any app; the `valid_*` family restricts both sides to non-filtered
/// sessions. The first session in each family is a new engagement by
/// definition.
fn compute_engagement(retained: &[&UsageSession], config: &FilterConfig) -> Vec<EngagementColumns> {
    let mut columns = vec![EngagementColumns::default(); retained.len()];

    for index in 0..retained.len() {
        let session = retained[index];
        let any_prev = previous_bounded(retained, index, false);
        let cols = &mut columns[index];

        match any_prev {
            None => {
                cols.any_new_engage_30s = true;
                cols.any_new_engage_custom = true;
            }
            Some(prev) => {
                let gap_seconds = gap_seconds(prev, session);
                cols.any_new_engage_30s = gap_seconds > NEW_ENGAGEMENT_GAP_SECONDS;
                cols.any_new_engage_custom = gap_seconds > config.engagement_gap_seconds;
                cols.any_switched_app = prev.app_package != session.app_package;
                cols.any_time_gap_hours = (gap_seconds / 3600.0).floor().max(0.0);
            }
        }

        if !session.is_filtered_app {
            match previous_bounded(retained, index, true) {
                None => {
                    cols.valid_new_engage_30s = true;
                    cols.valid_new_engage_custom = true;
                }
                Some(prev) => {
                    let gap_seconds = gap_seconds(prev, session);
                    cols.valid_new_engage_30s = gap_seconds > NEW_ENGAGEMENT_GAP_SECONDS;
                    cols.valid_new_engage_custom = gap_seconds > config.engagement_gap_seconds;
                    cols.valid_switched_app = prev.app_package != session.app_package;
                    cols.valid_time_gap_hours = (gap_seconds / 3600.0).floor().max(0.0);
                }
            }
        }
    }

    columns
}

fn previous_bounded<'a>(
    retained: &[&'a UsageSession],
    index: usize,
    valid_only: bool,
) -> Option<&'a UsageSession> {
    retained[..index]
        .iter()
        .rev()
        .find(|prev| prev.end_time.is_some() && !(valid_only && prev.is_filtered_app))
        .copied()
}

fn gap_seconds(prev: &UsageSession, session: &UsageSession) -> f64 {
    prev.end_time
        .map(|end| (session.start_time - end).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0)
}

/// Per-app session counts and duration ranks (1 = longest; ties broken by
/// start time), aligned with `retained`.
fn compute_app_rankings(retained: &[&UsageSession]) -> (Vec<u32>, Vec<u32>) {
    let mut counts = vec![0u32; retained.len()];
    let mut ranks = vec![0u32; retained.len()];

    let mut by_app: std::collections::BTreeMap<&str, Vec<usize>> = std::collections::BTreeMap::new();
    for (index, session) in retained.iter().enumerate() {
        by_app.entry(session.app_package.as_str()).or_default().push(index);
    }

    for indices in by_app.values() {
        let mut ordered = indices.clone();
        ordered.sort_by(|&a, &b| {
            let duration_a = retained[a].duration_seconds.unwrap_or(f64::NEG_INFINITY);
            let duration_b = retained[b].duration_seconds.unwrap_or(f64::NEG_INFINITY);
            duration_b
                .partial_cmp(&duration_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| retained[a].start_time.cmp(&retained[b].start_time))
        });
        for (rank, &index) in ordered.iter().enumerate() {
            counts[index] = indices.len() as u32;
            ranks[index] = rank as u32 + 1;
        }
    }

    (counts, ranks)
}
