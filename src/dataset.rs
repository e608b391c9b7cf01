//! Sensor Dataset Loader
//!
//! Reads pipe sensor history into `Reading`s from two formats:
//!
//! **CSV:** one row per reading with a header row. Column names are matched
//! case- and punctuation-insensitively, so both the utility GIS export
//! (`Location_Code`, `Flow_Rate`, `Operational_Hours`, `Leakage_Flag`, ...)
//! and snake_case field names (`segment_id`, `flow_rate`, ...) load.
//!
//! **JSON lines:** one serialized `Reading` per line (`.jsonl` / `.ndjson`).
//!
//! Unparseable numeric cells load as NaN rather than dropping the row, so
//! the detector reports the reading as invalid input instead of the loader
//! hiding it.
//!
//! # Usage
//!
//! ```ignore
//! let dataset = leakwatch::dataset::load("data/network.csv")?;
//! for reading in &dataset.readings {
//!     // feed the pipeline
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{Reading, SegmentId};

/// Rows with parse problems are reported individually up to this count
const MAX_LOGGED_ERRORS: usize = 10;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Empty file: {0}")]
    EmptyFile(String),

    #[error("{source_name}: missing required columns {missing:?}")]
    MissingColumns {
        source_name: String,
        missing: Vec<&'static str>,
    },

    #[error("Unsupported data file extension: {0} (expected .csv, .jsonl or .ndjson)")]
    UnsupportedFormat(PathBuf),

    #[error("No valid readings in {source_name}: {errors} errors")]
    NoReadings { source_name: String, errors: usize },
}

// ============================================================================
// CSV Quote-Aware Parsing
// ============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Quote a CSV field only when it needs it.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// Column Mapping
// ============================================================================

/// Lower-case alphanumerics only: "Flow_Rate" and "flow rate" both become "flowrate"
fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Column indices for every field we understand
#[derive(Debug, Default)]
struct ColumnMap {
    segment: Option<usize>,
    timestamp: Option<usize>,
    pressure: Option<usize>,
    flow_rate: Option<usize>,
    temperature: Option<usize>,
    vibration: Option<usize>,
    rpm: Option<usize>,
    operational_hours: Option<usize>,
    leak_flag: Option<usize>,
    zone: Option<usize>,
    block: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &str) -> Self {
        let mut map = Self::default();
        for (idx, col) in csv_split(header).iter().enumerate() {
            let slot = match normalize_column(col).as_str() {
                "locationcode" | "pipeid" | "segmentid" | "segment" => &mut map.segment,
                "timestamp" | "time" | "datetime" => &mut map.timestamp,
                "pressure" | "pressurepsi" => &mut map.pressure,
                "flowrate" | "flow" | "flowratelmin" => &mut map.flow_rate,
                "temperature" | "temp" | "temperaturec" => &mut map.temperature,
                "vibration" => &mut map.vibration,
                "rpm" | "rotationalspeed" => &mut map.rpm,
                "operationalhours" | "hours" => &mut map.operational_hours,
                "leakageflag" | "leakflag" | "leak" => &mut map.leak_flag,
                "zone" => &mut map.zone,
                "block" => &mut map.block,
                _ => continue,
            };
            // First matching column wins
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        map
    }

    fn missing_required(&self) -> Vec<&'static str> {
        [
            ("segment", self.segment),
            ("pressure", self.pressure),
            ("flow_rate", self.flow_rate),
            ("temperature", self.temperature),
            ("vibration", self.vibration),
            ("rpm", self.rpm),
            ("operational_hours", self.operational_hours),
        ]
        .into_iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Csv,
    JsonLines,
}

impl DataFormat {
    /// Choose a format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Ok(Self::Csv),
            Some("jsonl") | Some("ndjson") => Ok(Self::JsonLines),
            _ => Err(DatasetError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Load statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub source: String,
    pub format: DataFormat,
    pub rows: usize,
    pub error_rows: usize,
    pub segments: usize,
    pub labeled_leaks: usize,
    /// Timestamps came from row order because no timestamp column was usable
    pub synthetic_timestamps: bool,
}

/// Readings loaded from one source, in file order
#[derive(Debug, Clone)]
pub struct Dataset {
    pub readings: Vec<Reading>,
    pub info: DatasetInfo,
}

/// Load a dataset, choosing the format from the file extension.
pub fn load(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let format = DataFormat::from_path(path)?;
    let file = File::open(path).map_err(|e| DatasetError::Io(path.to_path_buf(), e))?;
    let reader = BufReader::new(file);
    let source = path.display().to_string();
    match format {
        DataFormat::Csv => parse_csv(reader, &source),
        DataFormat::JsonLines => parse_json_lines(reader, &source),
    }
}

/// Parse CSV readings from any buffered reader.
pub fn parse_csv(reader: impl BufRead, source: &str) -> Result<Dataset, DatasetError> {
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| DatasetError::EmptyFile(source.to_string()))?
        .map_err(|e| DatasetError::Io(PathBuf::from(source), e))?;
    let columns = ColumnMap::from_header(header.trim_start_matches('\u{feff}'));
    let missing = columns.missing_required();
    if !missing.is_empty() {
        return Err(DatasetError::MissingColumns {
            source_name: source.to_string(),
            missing,
        });
    }

    let mut readings = Vec::new();
    let mut errors = 0usize;
    let mut synthetic_timestamps = columns.timestamp.is_none();
    let mut line_num = 1usize;

    for line_result in lines {
        line_num += 1;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!(line = line_num, error = %e, "Error reading line");
                errors += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let row_index = readings.len() as u64;
        match parse_row(&line, &columns, row_index) {
            Ok((reading, used_row_order)) => {
                synthetic_timestamps |= used_row_order;
                readings.push(reading);
            }
            Err(e) => {
                if errors < MAX_LOGGED_ERRORS {
                    warn!(line = line_num, error = %e, "Parse error");
                }
                errors += 1;
            }
        }
    }

    // One bad timestamp switches the whole file to row order
    if synthetic_timestamps {
        for (i, reading) in readings.iter_mut().enumerate() {
            reading.timestamp = i as u64;
        }
    }

    finish(readings, errors, source, DataFormat::Csv, synthetic_timestamps)
}

/// Parse JSON-lines readings from any buffered reader.
pub fn parse_json_lines(reader: impl BufRead, source: &str) -> Result<Dataset, DatasetError> {
    let mut readings = Vec::new();
    let mut errors = 0usize;

    for (i, line_result) in reader.lines().enumerate() {
        let line_num = i + 1;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!(line = line_num, error = %e, "Error reading line");
                errors += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Reading>(&line) {
            Ok(r) => readings.push(r),
            Err(e) => {
                if errors < MAX_LOGGED_ERRORS {
                    warn!(line = line_num, error = %e, "Invalid reading JSON");
                }
                errors += 1;
            }
        }
    }

    finish(readings, errors, source, DataFormat::JsonLines, false)
}

fn finish(
    readings: Vec<Reading>,
    errors: usize,
    source: &str,
    format: DataFormat,
    synthetic_timestamps: bool,
) -> Result<Dataset, DatasetError> {
    if readings.is_empty() {
        return Err(DatasetError::NoReadings {
            source_name: source.to_string(),
            errors,
        });
    }

    let segments: HashSet<&SegmentId> = readings.iter().map(|r| &r.segment_id).collect();
    let info = DatasetInfo {
        source: source.to_string(),
        format,
        rows: readings.len(),
        error_rows: errors,
        segments: segments.len(),
        labeled_leaks: readings.iter().filter(|r| r.is_labeled_leak()).count(),
        synthetic_timestamps,
    };

    info!(
        source = %info.source,
        rows = info.rows,
        segments = info.segments,
        errors = info.error_rows,
        labeled_leaks = info.labeled_leaks,
        "Dataset loaded"
    );
    if info.synthetic_timestamps {
        warn!(source = %info.source, "Missing or unparseable timestamps; using row order");
    }

    Ok(Dataset { readings, info })
}

// ============================================================================
// Row Parsing
// ============================================================================

/// Parse one CSV row. Returns the reading and whether its timestamp fell back to row order.
fn parse_row(line: &str, columns: &ColumnMap, row_index: u64) -> Result<(Reading, bool), String> {
    let owned = csv_split(line);
    let fields: Vec<&str> = owned.iter().map(|s| s.trim()).collect();

    let segment = get_str(&fields, columns.segment).ok_or("Missing segment identifier")?;

    let (timestamp, used_row_order) = match get_str(&fields, columns.timestamp) {
        Some(s) => match parse_datetime_string(s) {
            Ok(t) => (t, false),
            Err(_) => (row_index, true),
        },
        None => (row_index, true),
    };

    let reading = Reading {
        segment_id: SegmentId::new(segment),
        timestamp,
        pressure: get_f64(&fields, columns.pressure),
        flow_rate: get_f64(&fields, columns.flow_rate),
        temperature: get_f64(&fields, columns.temperature),
        vibration: get_f64(&fields, columns.vibration),
        rpm: get_f64(&fields, columns.rpm),
        operational_hours: get_f64(&fields, columns.operational_hours),
        leak_flag: get_str(&fields, columns.leak_flag).and_then(parse_flag),
        zone: get_str(&fields, columns.zone).map(str::to_string),
        block: get_str(&fields, columns.block).map(str::to_string),
    };
    Ok((reading, used_row_order))
}

/// Non-empty trimmed cell
fn get_str<'a>(fields: &[&'a str], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| fields.get(i).copied())
        .filter(|s| !s.is_empty())
}

/// Numeric cell, NaN when missing or unparseable
fn get_f64(fields: &[&str], idx: Option<usize>) -> f64 {
    get_str(fields, idx)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "leak" => Some(true),
        "0" | "0.0" | "false" | "no" | "normal" => Some(false),
        _ => None,
    }
}

/// Parse Unix seconds, RFC 3339 or "%Y-%m-%d %H:%M:%S" (UTC) to Unix seconds
fn parse_datetime_string(s: &str) -> Result<u64, String> {
    let s = s.trim().trim_matches('"');

    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Err("Empty timestamp".to_string());
    }

    if let Ok(epoch) = s.parse::<u64>() {
        // Millisecond epochs
        return Ok(if epoch > 10_000_000_000 { epoch / 1000 } else { epoch });
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return u64::try_from(dt.timestamp()).map_err(|_| format!("Timestamp before 1970: '{s}'"));
    }

    for fmt in &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return u64::try_from(dt.and_utc().timestamp())
                .map_err(|_| format!("Timestamp before 1970: '{s}'"));
        }
    }

    Err(format!("Cannot parse timestamp: '{}'", s))
}

// ============================================================================
// Writing
// ============================================================================

/// Header matching `csv_row`, loadable by `parse_csv`
pub const CSV_HEADER: &str =
    "Location_Code,Timestamp,Zone,Block,Pressure,Flow_Rate,Temperature,Vibration,RPM,Operational_Hours,Leakage_Flag";

/// Render a reading as one CSV row under `CSV_HEADER`.
pub fn csv_row(r: &Reading) -> String {
    let flag = match r.leak_flag {
        Some(true) => "1",
        Some(false) => "0",
        None => "",
    };
    format!(
        "{},{},{},{},{:.3},{:.3},{:.2},{:.3},{:.1},{:.1},{}",
        csv_escape(r.segment_id.as_str()),
        r.timestamp,
        csv_escape(r.zone.as_deref().unwrap_or("")),
        csv_escape(r.block.as_deref().unwrap_or("")),
        r.pressure,
        r.flow_rate,
        r.temperature,
        r.vibration,
        r.rpm,
        r.operational_hours,
        flag
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const GIS_CSV: &str = "\
Location_Code,Zone,Block,Pipe,Latitude,Longitude,Pressure,Flow_Rate,Temperature,Vibration,RPM,Operational_Hours,Leakage_Flag
Z1_B1_P1,Zone_1,Block_1,P1,12.97,77.59,71.2,48.3,19.5,1.10,1480,3200,0
Z1_B1_P2,Zone_1,Block_1,P2,12.98,77.60,69.8,61.0,20.1,1.35,1475,2900,1
Z2_B3_P1,Zone_2,Block_3,P1,12.95,77.61,abc,50.2,18.7,0.95,1500,4100,0
";

    #[test]
    fn test_unparseable_timestamp_switches_every_row_to_row_order() {
        let csv = "\
Pipe_ID,Timestamp,Pressure,Flow_Rate,Temperature,Vibration,RPM,Operational_Hours
P1,2024-01-01 00:00:00,98.0,50.0,16.0,1.2,1450,1200
P1,,98.0,50.0,16.0,1.2,1450,1200
P1,2024-01-01 00:02:00,98.0,50.0,16.0,1.2,1450,1200
";
        let ds = parse_csv(csv.as_bytes(), "gap.csv").unwrap();
        assert!(ds.info.synthetic_timestamps);
        let timestamps: Vec<u64> = ds.readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
    }

    #[test]
    fn test_csv_split_quoted() {
        assert_eq!(csv_split(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(csv_split(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
        assert_eq!(csv_split("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_gis_export_columns_detected() {
        let ds = parse_csv(GIS_CSV.as_bytes(), "gis.csv").unwrap();
        assert_eq!(ds.readings.len(), 3);
        assert_eq!(ds.info.segments, 3);
        assert_eq!(ds.info.labeled_leaks, 1);
        assert!(ds.info.synthetic_timestamps);

        let first = &ds.readings[0];
        assert_eq!(first.segment_id.as_str(), "Z1_B1_P1");
        assert_eq!(first.zone.as_deref(), Some("Zone_1"));
        assert_eq!(first.block.as_deref(), Some("Block_1"));
        assert_eq!(first.flow_rate, 48.3);
        assert_eq!(first.rpm, 1480.0);
        assert_eq!(first.leak_flag, Some(false));
        assert_eq!(first.timestamp, 0);
        assert_eq!(ds.readings[2].timestamp, 2);
    }

    #[test]
    fn test_unparseable_cell_becomes_nan() {
        let ds = parse_csv(GIS_CSV.as_bytes(), "gis.csv").unwrap();
        let bad = &ds.readings[2];
        assert!(bad.pressure.is_nan());
        assert_eq!(bad.validate().unwrap_err().field, "pressure");
    }

    #[test]
    fn test_missing_required_columns() {
        let csv = "segment_id,pressure\nP1,70\n";
        match parse_csv(csv.as_bytes(), "short.csv") {
            Err(DatasetError::MissingColumns { missing, .. }) => {
                assert!(missing.contains(&"flow_rate"));
                assert!(missing.contains(&"operational_hours"));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_datetime_string("1700000000"), Ok(1_700_000_000));
        assert_eq!(parse_datetime_string("1700000000000"), Ok(1_700_000_000));
        assert_eq!(parse_datetime_string("2024-01-01T00:00:00Z"), Ok(1_704_067_200));
        assert_eq!(parse_datetime_string("2024-01-01 00:01:00"), Ok(1_704_067_260));
        assert!(parse_datetime_string("yesterday").is_err());
    }

    #[test]
    fn test_rows_without_segment_are_errors() {
        let csv = "segment_id,timestamp,pressure,flow_rate,temperature,vibration,rpm,operational_hours\n\
                   P1,10,70,50,18,1.2,1450,100\n\
                   ,11,70,50,18,1.2,1450,100\n";
        let ds = parse_csv(csv.as_bytes(), "x.csv").unwrap();
        assert_eq!(ds.readings.len(), 1);
        assert_eq!(ds.info.error_rows, 1);
        assert_eq!(ds.readings[0].timestamp, 10);
        assert!(!ds.info.synthetic_timestamps);
        assert_eq!(ds.readings[0].leak_flag, None);
    }

    #[test]
    fn test_csv_row_loads_back() {
        let ds = parse_csv(GIS_CSV.as_bytes(), "gis.csv").unwrap();
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for r in &ds.readings[..2] {
            out.push_str(&csv_row(r));
            out.push('\n');
        }
        let again = parse_csv(out.as_bytes(), "again.csv").unwrap();
        assert_eq!(again.readings.len(), 2);
        assert_eq!(again.readings[1].leak_flag, Some(true));
        assert_eq!(again.readings[1].flow_rate, 61.0);
        assert!(!again.info.synthetic_timestamps);
    }

    #[test]
    fn test_json_lines() {
        let jsonl = r#"{"segment_id":"P1","timestamp":1,"pressure":70.0,"flow_rate":50.0,"temperature":18.0,"vibration":1.2,"rpm":1450.0,"operational_hours":100.0}

not json
{"segment_id":"P1","timestamp":2,"pressure":70.0,"flow_rate":51.0,"temperature":18.0,"vibration":1.2,"rpm":1450.0,"operational_hours":100.0,"leak_flag":true}
"#;
        let ds = parse_json_lines(jsonl.as_bytes(), "x.jsonl").unwrap();
        assert_eq!(ds.readings.len(), 2);
        assert_eq!(ds.info.error_rows, 1);
        assert_eq!(ds.info.labeled_leaks, 1);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DataFormat::from_path(Path::new("a/b.CSV")).unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_path(Path::new("b.ndjson")).unwrap(), DataFormat::JsonLines);
        assert!(DataFormat::from_path(Path::new("b.parquet")).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("network.csv");
        std::fs::write(&path, GIS_CSV).expect("write");
        let ds = load(&path).unwrap();
        assert_eq!(ds.info.rows, 3);
        assert_eq!(ds.info.format, DataFormat::Csv);
    }
}
