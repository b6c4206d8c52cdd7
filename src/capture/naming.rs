//! Capture file naming: `<capture_point>_<timestamp>.<ext>`.

use std::path::Path;

use chrono::NaiveDateTime;

use super::ingest::IngestError;

/// Extension of raw capture summaries
pub const SUMMARY_EXTENSION: &str = "summary";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Capture point id: the token before the first underscore of the file name.
///
/// Names without an underscore, or with nothing before it, are rejected.
pub fn capture_point_from_filename(path: &Path) -> Result<String, IngestError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IngestError::InvalidFileName(path.display().to_string()))?;

    match name.split_once('_') {
        Some((point, _)) if !point.is_empty() => Ok(point.to_string()),
        _ => Err(IngestError::InvalidFileName(name.to_string())),
    }
}

/// File name for a capture point's summary taken at `timestamp`
pub fn capture_file_name(point: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}_{}.{}",
        point,
        timestamp.format(TIMESTAMP_FORMAT),
        SUMMARY_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_is_token_before_first_underscore() {
        let point = capture_point_from_filename(Path::new("/tmp/captures/s1_20240101_120000.summary"));
        assert_eq!(point.unwrap(), "s1");
        let point = capture_point_from_filename(Path::new("core_switch_x.pcap"));
        assert_eq!(point.unwrap(), "core");
    }

    #[test]
    fn test_names_without_prefix_are_rejected() {
        for name in ["s1.summary", "_20240101.summary", "capture"] {
            let err = capture_point_from_filename(Path::new(name)).unwrap_err();
            assert!(matches!(err, IngestError::InvalidFileName(_)), "{name}");
        }
    }

    #[test]
    fn test_capture_file_name_round_trips_point() {
        let ts = NaiveDateTime::parse_from_str("2024-01-01 12:30:05", "%Y-%m-%d %H:%M:%S").unwrap();
        let name = capture_file_name("s2", ts);
        assert_eq!(name, "s2_20240101_123005.summary");
        assert_eq!(capture_point_from_filename(Path::new(&name)).unwrap(), "s2");
    }
}
