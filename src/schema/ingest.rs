//! Raw-event ingest
//!
//! Parses upstream-normalized event rows from NDJSON, JSON arrays, or CSV
//! into [`RawEvent`] records. Ingest is strict about per-row errors: a bad
//! row fails the whole parse with its location, so a malformed file never
//! silently feeds a partial stream into the engine.

use crate::error::EngineError;
use crate::types::{InteractionType, RawEvent};
use chrono::{DateTime, Utc};

/// Adapter for parsing raw events from supported input formats
pub struct RawEventAdapter;

impl RawEventAdapter {
    /// Parse a JSON string containing an array of raw events
    pub fn parse_array(json: &str) -> Result<Vec<RawEvent>, EngineError> {
        let events: Vec<RawEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing raw events
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse CSV rows containing raw events.
    ///
    /// Columns are matched by header name; `app_label` and `event_timezone`
    /// are optional and empty cells read as absent.
    pub fn parse_csv(data: &str) -> Result<Vec<RawEvent>, EngineError> {
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let device_id_col = column("device_id")
            .ok_or_else(|| EngineError::ParseError("missing column: device_id".to_string()))?;
        let app_package_col = column("app_package")
            .ok_or_else(|| EngineError::ParseError("missing column: app_package".to_string()))?;
        let timestamp_col = column("timestamp")
            .ok_or_else(|| EngineError::ParseError("missing column: timestamp".to_string()))?;
        let interaction_type_col = column("interaction_type").ok_or_else(|| {
            EngineError::ParseError("missing column: interaction_type".to_string())
        })?;
        let app_label_col = column("app_label");
        let event_timezone_col = column("event_timezone");

        let mut events = Vec::new();
        for (row_num, row) in reader.records().enumerate() {
            let row = row?;
            let cell = |index: usize| row.get(index).unwrap_or_default();
            let optional_cell = |index: Option<usize>| {
                index
                    .map(|i| cell(i))
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            };

            let timestamp = parse_timestamp(cell(timestamp_col)).map_err(|reason| {
                EngineError::ParseError(format!("Failed to parse row {}: {reason}", row_num + 2))
            })?;
            let interaction_type: InteractionType = cell(interaction_type_col)
                .parse()
                .unwrap_or_else(|never| match never {});

            events.push(RawEvent {
                device_id: cell(device_id_col).to_string(),
                app_package: cell(app_package_col).to_string(),
                app_label: optional_cell(app_label_col),
                timestamp,
                interaction_type,
                event_timezone: optional_cell(event_timezone_col),
            });
        }
        Ok(events)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {value:?}: {e}"))
}
