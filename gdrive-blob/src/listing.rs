use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ObjectSummary;

const UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// One row of the file listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub file: String,
    pub size: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub owner: Option<String>,
}

impl FileStatus {
    pub fn from_summary(summary: ObjectSummary) -> Self {
        Self {
            file: summary.key,
            size: pretty_size(summary.size_bytes),
            last_modified: summary.last_modified,
            owner: summary.owner,
        }
    }
}

impl From<ObjectSummary> for FileStatus {
    fn from(summary: ObjectSummary) -> Self {
        Self::from_summary(summary)
    }
}

/// Human readable byte count in decimal units, three significant digits
///
/// `1337` renders as `"1.34 kB"`, `12582912` as `"12.6 MB"`.
pub fn pretty_size(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let exponent = ((bytes as f64).log10() / 3.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1000f64.powi(exponent as i32);

    format!("{} {}", significant(value, 3), UNITS[exponent])
}

fn significant(value: f64, digits: i32) -> String {
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (digits - magnitude).max(0) as usize;
    let rendered = format!("{:.*}", decimals, value);
    if rendered.contains('.') {
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sizes_are_plain_bytes() {
        assert_eq!(pretty_size(0), "0 B");
        assert_eq!(pretty_size(1), "1 B");
        assert_eq!(pretty_size(999), "999 B");
    }

    #[test]
    fn decimal_units_with_three_significant_digits() {
        assert_eq!(pretty_size(1000), "1 kB");
        assert_eq!(pretty_size(1337), "1.34 kB");
        assert_eq!(pretty_size(12_582_912), "12.6 MB");
        assert_eq!(pretty_size(5_000_000_000), "5 GB");
        assert_eq!(pretty_size(123_456_789), "123 MB");
    }

    #[test]
    fn listing_row_serializes_in_camel_case() {
        let status = FileStatus::from(ObjectSummary {
            key: "movie.mov".into(),
            size_bytes: 1337,
            last_modified: None,
            owner: Some("public".into()),
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["file"], "movie.mov");
        assert_eq!(json["size"], "1.34 kB");
        assert_eq!(json["owner"], "public");
        assert!(json.get("lastModified").is_some());
    }
}
