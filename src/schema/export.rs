//! Record export
//!
//! Writes assembled session records to CSV or NDJSON and reads them back.
//! The tabular schema is the record's fields in declaration order; every
//! field survives a round trip, including the anomaly-flag column, which
//! renders through the flags' `Display`/`FromStr` forms.

use crate::error::EngineError;
use crate::types::{AnomalyFlag, RawEvent, SessionRecord, TerminationReason};

/// Separator between flags within the CSV flag column
const FLAG_SEPARATOR: &str = "; ";

const HEADERS: [&str; 21] = [
    "device_id",
    "app_package",
    "app_label",
    "is_filtered_app",
    "start_time",
    "end_time",
    "duration_seconds",
    "duration_minutes",
    "termination_reason",
    "flags",
    "preceding_gap_hours",
    "app_session_count",
    "duration_rank",
    "any_app_new_engage_30s",
    "any_app_new_engage_custom",
    "any_app_switched_app",
    "any_app_usage_time_gap_hours",
    "valid_app_new_engage_30s",
    "valid_app_new_engage_custom",
    "valid_app_switched_app",
    "valid_app_usage_time_gap_hours",
];

/// Writer/reader for assembled session records
pub struct RecordWriter;

impl RecordWriter {
    /// Render records as CSV with a header row
    pub fn write_csv(records: &[SessionRecord]) -> Result<String, EngineError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADERS)?;
        for record in records {
            let fields: [String; 21] = [
                record.device_id.clone(),
                record.app_package.clone(),
                record.app_label.clone(),
                record.is_filtered_app.to_string(),
                record.start_time.clone(),
                record.end_time.clone(),
                optional_number(record.duration_seconds),
                optional_number(record.duration_minutes),
                record.termination_reason.to_string(),
                join_flags(&record.flags),
                record.preceding_gap_hours.to_string(),
                record.app_session_count.to_string(),
                record.duration_rank.to_string(),
                record.any_app_new_engage_30s.to_string(),
                record.any_app_new_engage_custom.to_string(),
                record.any_app_switched_app.to_string(),
                record.any_app_usage_time_gap_hours.to_string(),
                record.valid_app_new_engage_30s.to_string(),
                record.valid_app_new_engage_custom.to_string(),
                record.valid_app_switched_app.to_string(),
                record.valid_app_usage_time_gap_hours.to_string(),
            ];
            writer.write_record(&fields)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::ParseError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| EngineError::ParseError(e.to_string()))
    }

    /// Read records back from CSV produced by [`write_csv`].
    ///
    /// [`write_csv`]: RecordWriter::write_csv
    pub fn read_csv(data: &str) -> Result<Vec<SessionRecord>, EngineError> {
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let mut records = Vec::new();
        for (row_num, row) in reader.records().enumerate() {
            let row = row?;
            let location = |reason: String| {
                EngineError::ParseError(format!("Failed to parse row {}: {reason}", row_num + 2))
            };
            if row.len() != HEADERS.len() {
                return Err(location(format!(
                    "expected {} columns, got {}",
                    HEADERS.len(),
                    row.len()
                )));
            }
            let cell = |index: usize| row.get(index).unwrap_or_default().to_string();

            records.push(SessionRecord {
                device_id: cell(0),
                app_package: cell(1),
                app_label: cell(2),
                is_filtered_app: parse_bool(&cell(3)).map_err(&location)?,
                start_time: cell(4),
                end_time: cell(5),
                duration_seconds: parse_optional_number(&cell(6)).map_err(&location)?,
                duration_minutes: parse_optional_number(&cell(7)).map_err(&location)?,
                termination_reason: cell(8)
                    .parse::<TerminationReason>()
                    .map_err(&location)?,
                flags: split_flags(&cell(9)).map_err(&location)?,
                preceding_gap_hours: parse_number(&cell(10)).map_err(&location)?,
                app_session_count: parse_count(&cell(11)).map_err(&location)?,
                duration_rank: parse_count(&cell(12)).map_err(&location)?,
                any_app_new_engage_30s: parse_bool(&cell(13)).map_err(&location)?,
                any_app_new_engage_custom: parse_bool(&cell(14)).map_err(&location)?,
                any_app_switched_app: parse_bool(&cell(15)).map_err(&location)?,
                any_app_usage_time_gap_hours: parse_number(&cell(16)).map_err(&location)?,
                valid_app_new_engage_30s: parse_bool(&cell(17)).map_err(&location)?,
                valid_app_new_engage_custom: parse_bool(&cell(18)).map_err(&location)?,
                valid_app_switched_app: parse_bool(&cell(19)).map_err(&location)?,
                valid_app_usage_time_gap_hours: parse_number(&cell(20)).map_err(&location)?,
            });
        }
        Ok(records)
    }

    /// Render records as NDJSON, one record per line
    pub fn write_ndjson(records: &[SessionRecord]) -> Result<String, EngineError> {
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Read records back from NDJSON
    pub fn read_ndjson(data: &str) -> Result<Vec<SessionRecord>, EngineError> {
        let mut records = Vec::new();
        for (line_num, line) in data.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Render detail events as NDJSON, one event per line
    pub fn write_events_ndjson(events: &[RawEvent]) -> Result<String, EngineError> {
        let mut out = String::new();
        for event in events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn join_flags(flags: &[AnomalyFlag]) -> String {
    flags
        .iter()
        .map(|flag| flag.to_string())
        .collect::<Vec<_>>()
        .join(FLAG_SEPARATOR)
}

fn split_flags(cell: &str) -> Result<Vec<AnomalyFlag>, String> {
    if cell.is_empty() {
        return Ok(Vec::new());
    }
    cell.split(FLAG_SEPARATOR).map(str::parse).collect()
}

fn parse_bool(cell: &str) -> Result<bool, String> {
    cell.parse().map_err(|_| format!("invalid bool: {cell:?}"))
}

fn parse_number(cell: &str) -> Result<f64, String> {
    cell.parse().map_err(|_| format!("invalid number: {cell:?}"))
}

fn parse_count(cell: &str) -> Result<u32, String> {
    cell.parse().map_err(|_| format!("invalid count: {cell:?}"))
}

fn parse_optional_number(cell: &str) -> Result<Option<f64>, String> {
    if cell.is_empty() {
        return Ok(None);
    }
    parse_number(cell).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record() -> SessionRecord {
        SessionRecord {
            device_id: "device-1".to_string(),
            app_package: "com.app.a".to_string(),
            app_label: "App A".to_string(),
            is_filtered_app: false,
            start_time: "2024-03-01T14:00:00.000Z".to_string(),
            end_time: "2024-03-01T14:02:00.000Z".to_string(),
            duration_seconds: Some(120.0),
            duration_minutes: Some(2.0),
            termination_reason: TerminationReason::ExplicitStopEvent,
            flags: vec![
                AnomalyFlag::DataGap { threshold_hours: 3 },
                AnomalyFlag::DeviceStartupBoundary,
            ],
            preceding_gap_hours: 3.25,
            app_session_count: 4,
            duration_rank: 2,
            any_app_new_engage_30s: true,
            any_app_new_engage_custom: false,
            any_app_switched_app: true,
            any_app_usage_time_gap_hours: 3.0,
            valid_app_new_engage_30s: true,
            valid_app_new_engage_custom: false,
            valid_app_switched_app: true,
            valid_app_usage_time_gap_hours: 3.0,
        }
    }

    fn unterminated_record() -> SessionRecord {
        SessionRecord {
            end_time: String::new(),
            duration_seconds: None,
            duration_minutes: None,
            termination_reason: TerminationReason::EndOfStreamUnterminated,
            flags: Vec::new(),
            ..sample_record()
        }
    }

    #[test]
    fn test_csv_round_trip_is_lossless() {
        let records = vec![sample_record(), unterminated_record()];
        let csv = RecordWriter::write_csv(&records).unwrap();
        let parsed = RecordWriter::read_csv(&csv).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_csv_has_expected_header() {
        let csv = RecordWriter::write_csv(&[sample_record()]).unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("device_id,app_package,app_label"));
        assert!(header.ends_with("valid_app_usage_time_gap_hours"));
    }

    #[test]
    fn test_flag_column_renders_readable_strings() {
        let csv = RecordWriter::write_csv(&[sample_record()]).unwrap();
        assert!(csv.contains(">3-HR TIME GAP; DEVICE STARTUP"));
    }

    #[test]
    fn test_ndjson_round_trip_is_lossless() {
        let records = vec![sample_record(), unterminated_record()];
        let ndjson = RecordWriter::write_ndjson(&records).unwrap();
        let parsed = RecordWriter::read_ndjson(&ndjson).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_csv_bad_cell_reports_row() {
        let records = vec![sample_record()];
        let csv = RecordWriter::write_csv(&records).unwrap();
        let corrupted = csv.replace("3.25", "many");
        let err = RecordWriter::read_csv(&corrupted).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_empty_record_set() {
        let csv = RecordWriter::write_csv(&[]).unwrap();
        assert_eq!(RecordWriter::read_csv(&csv).unwrap(), Vec::new());
    }
}
