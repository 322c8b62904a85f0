//! CSV export of the balloon table
//!
//! One row per balloon, sorted by page then number, for inspection reports
//! and spreadsheets.

use crate::annotation::BalloonRecord;
use crate::atomic::write_atomic;
use std::io::Write;
use std::path::Path;

/// Error types for CSV export
#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CsvExportResult<T> = Result<T, CsvExportError>;

/// Column headers, in order.
pub const HEADERS: [&str; 5] = ["Number", "Page", "X (pts)", "Y (pts)", "Description"];

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self { include_headers: true, delimiter: b',' }
    }
}

/// Export balloons as CSV.
///
/// Pages are written 1-based; X and Y are the circle centre in points,
/// rounded to two decimals.
pub fn export_balloons_csv<W: Write>(
    writer: W,
    balloons: &[&BalloonRecord],
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record(HEADERS)?;
    }

    let mut rows = balloons.to_vec();
    rows.sort_by_key(|balloon| (balloon.page(), balloon.number));

    for balloon in rows {
        csv_writer.write_record(&[
            balloon.number.to_string(),
            (balloon.page() + 1).to_string(),
            format!("{:.2}", balloon.center_point.x),
            format!("{:.2}", balloon.center_point.y),
            balloon.description.clone(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Export balloons to a file, replacing it only once the whole table is written.
pub fn export_balloons_csv_to_path(
    path: &Path,
    balloons: &[&BalloonRecord],
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    write_atomic(path, |file| export_balloons_csv(file, balloons, config))?;
    log::info!("wrote {} balloon rows to {}", balloons.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PageCoordinate;

    fn balloon(number: u32, page: u32, x: f64, y: f64, description: &str) -> BalloonRecord {
        let center = PageCoordinate::new(x, y);
        BalloonRecord::new(number, page, center, center).with_description(description)
    }

    fn export(balloons: &[&BalloonRecord], config: &CsvExportConfig) -> String {
        let mut output = Vec::new();
        export_balloons_csv(&mut output, balloons, config).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn rows_are_sorted_and_one_based() {
        let a = balloon(2, 1, 10.0, 20.0, "slot");
        let b = balloon(1, 1, 1.005, 2.0, "hole, thru");
        let c = balloon(9, 0, 100.123, 200.456, "");

        let csv = export(&[&a, &b, &c], &CsvExportConfig::default());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Number,Page,X (pts),Y (pts),Description");
        assert_eq!(lines[1], "9,1,100.12,200.46,");
        assert!(lines[2].starts_with("1,2,"));
        assert!(lines[2].ends_with(",\"hole, thru\""));
        assert_eq!(lines[3], "2,2,10.00,20.00,slot");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn headers_and_delimiter_are_configurable() {
        let a = balloon(1, 0, 5.0, 5.0, "x");
        let config = CsvExportConfig { include_headers: false, delimiter: b';' };
        assert_eq!(export(&[&a], &config), "1;1;5.00;5.00;x\n");
    }

    #[test]
    fn export_to_path_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balloons.csv");
        let a = balloon(3, 0, 1.0, 2.0, "edge");

        export_balloons_csv_to_path(&path, &[&a], &CsvExportConfig::default()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("3,1,1.00,2.00,edge"));
    }
}
