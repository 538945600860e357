use crate::record::{HistoryRow, SpeciesLog};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Writer};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub fn print_hms(start: &Instant) {
    let elapsed = start.elapsed();
    let secs = elapsed.as_secs();
    println!(
        "Elapsed: {}h {}m {:.2}s",
        secs / 3600,
        (secs % 3600) / 60,
        (secs % 60) as f64 + f64::from(elapsed.subsec_millis()) / 1000.0
    );
}

/// Spinner shown while a request is outstanding.
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Save species logs to a CSV file
pub fn save_to_csv(logs: &[SpeciesLog], filename: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    for log in logs {
        writer.serialize(HistoryRow::from(log))?;
    }

    writer.flush()?;
    info!("Data saved to {}", filename.display());
    Ok(())
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("biodiversity_logs_{date}.csv")
}

/// Writes an admin CSV export into `dir`, named after `date`.
pub fn write_export(dir: &Path, contents: &str, date: NaiveDate) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(date));
    fs::write(&path, contents)?;
    info!("CSV saved to {}", path.display());
    Ok(path)
}

/// Number of data rows in a CSV document with a header line.
pub fn csv_row_count(contents: &str) -> Result<usize, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(contents.as_bytes());
    let mut count = 0;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "biodiversity_logs_2026-03-09.csv");
    }

    #[test]
    fn test_write_export_and_count_rows() {
        let dir = tempdir().unwrap();
        let contents = "id,species,notes\n1,Sparrow,\"flock, 12 birds\"\n2,Heron,\n";
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let path = write_export(&dir.path().join("exports"), contents, date).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), contents);
        assert_eq!(csv_row_count(contents).unwrap(), 2);
        assert_eq!(csv_row_count("").unwrap(), 0);
    }

    #[test]
    fn test_save_to_csv_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let logs: Vec<SpeciesLog> = serde_json::from_value(serde_json::json!([
            {"id": 1, "species_name": "Sparrow", "location_name": "Park",
             "latitude": 0.0, "longitude": 0.0, "created_at": "2026-10-01T08:00:00"},
            {"id": 2, "species_name": "Heron"}
        ]))
        .unwrap();

        save_to_csv(&logs, &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("id,species,location,latitude,longitude"));
        assert_eq!(csv_row_count(&written).unwrap(), 2);
    }
}
