//! Persistent CSV log of per-batch call results.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::error::Result;
use crate::types::BatchCallRecord;
use crate::utils::{csv_join, csv_split};

const HEADER: &[&str] = &[
    "batch_id",
    "timestamp",
    "name",
    "phone_number",
    "appointment_date",
    "location",
    "call_answered",
    "call_status",
    "call_duration_seconds",
    "call_duration_formatted",
    "call_id",
    "error_message",
];

/// Per-batch aggregate, for display.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub timestamp: String,
    pub total_calls: usize,
    pub answered: usize,
    pub not_answered: usize,
    pub errors: usize,
}

/// Appends call results to a CSV file, writing the fixed header on first
/// use.
pub struct BatchLogger {
    log_file: PathBuf,
}

impl BatchLogger {
    pub fn new(log_file: impl Into<PathBuf>) -> Result<Self> {
        let log_file = log_file.into();
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)?;
        }
        if !log_file.exists() {
            fs::write(&log_file, format!("{}\n", HEADER.join(",")))?;
            info!(path = %log_file.display(), "initialized batch log file");
        }
        Ok(Self { log_file })
    }

    /// Append one row per record under the given batch id.
    pub fn log_batch(&self, batch_id: &str, records: &[BatchCallRecord]) -> Result<()> {
        let timestamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))?;

        let mut file = OpenOptions::new().append(true).open(&self.log_file)?;
        for record in records {
            let duration = record.duration_secs.unwrap_or(0.0);
            let fields = vec![
                batch_id.to_string(),
                timestamp.clone(),
                record.name.clone(),
                record.phone_number.clone(),
                record.appointment_date.clone(),
                record.location.clone(),
                if record.answered { "Yes" } else { "No" }.to_string(),
                record.status.clone(),
                duration.to_string(),
                format_duration(duration),
                record.call_id.clone().unwrap_or_default(),
                record.error.clone().unwrap_or_default(),
            ];
            writeln!(file, "{}", csv_join(&fields))?;
        }

        info!(
            batch_id,
            calls = records.len(),
            path = %self.log_file.display(),
            "logged batch results"
        );
        Ok(())
    }

    /// Aggregate the log into per-batch summaries, newest first.
    pub fn recent_batches(&self, limit: usize) -> Vec<BatchSummary> {
        let content = match fs::read_to_string(&self.log_file) {
            Ok(content) => content,
            Err(e) => {
                error!(error = %e, "error reading batch log");
                return Vec::new();
            }
        };

        let mut batches: HashMap<String, BatchSummary> = HashMap::new();
        for line in content.lines().skip(1) {
            let fields = csv_split(line);
            if fields.len() != HEADER.len() {
                continue;
            }
            let summary = batches
                .entry(fields[0].clone())
                .or_insert_with(|| BatchSummary {
                    batch_id: fields[0].clone(),
                    timestamp: fields[1].clone(),
                    total_calls: 0,
                    answered: 0,
                    not_answered: 0,
                    errors: 0,
                });
            summary.total_calls += 1;
            if fields[6] == "Yes" {
                summary.answered += 1;
            } else {
                summary.not_answered += 1;
            }
            if !fields[11].is_empty() {
                summary.errors += 1;
            }
        }

        let mut summaries: Vec<BatchSummary> = batches.into_values().collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        summaries.truncate(limit);
        summaries
    }
}

/// `135.0` -> `2m 15s`, `45.0` -> `45s`.
fn format_duration(seconds: f64) -> String {
    if seconds <= 0.0 {
        return "0s".to_string();
    }
    let total = seconds as u64;
    let (minutes, secs) = (total / 60, total % 60);
    if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, answered: bool, error: Option<&str>) -> BatchCallRecord {
        BatchCallRecord {
            name: name.to_string(),
            phone_number: "+15551234567".to_string(),
            appointment_date: "2026-03-02T09:00:00Z".to_string(),
            location: String::new(),
            answered,
            status: if answered { "completed" } else { "no-answer" }.to_string(),
            duration_secs: Some(135.0),
            call_id: Some("CA1".to_string()),
            user_response: String::new(),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn creates_file_with_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.csv");

        BatchLogger::new(&path).unwrap();
        let logger = BatchLogger::new(&path).unwrap();
        logger.log_batch("b1", &[record("Jane", true, None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("batch_id,timestamp,name"));
        assert!(lines[1].starts_with("b1,"));
    }

    #[test]
    fn rows_contain_answered_flag_and_formatted_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        let logger = BatchLogger::new(&path).unwrap();

        logger.log_batch("b1", &[record("Jane", true, None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let row = csv_split(content.lines().nth(1).unwrap());
        assert_eq!(row[6], "Yes");
        assert_eq!(row[9], "2m 15s");
        assert_eq!(row[10], "CA1");
    }

    #[test]
    fn recent_batches_aggregates_counts() {
        let dir = tempdir().unwrap();
        let logger = BatchLogger::new(dir.path().join("batch.csv")).unwrap();

        logger
            .log_batch(
                "b1",
                &[
                    record("Jane", true, None),
                    record("John", false, Some("busy line")),
                ],
            )
            .unwrap();
        logger.log_batch("b2", &[record("Ann", true, None)]).unwrap();

        let batches = logger.recent_batches(10);
        assert_eq!(batches.len(), 2);
        let b1 = batches.iter().find(|b| b.batch_id == "b1").unwrap();
        assert_eq!(b1.total_calls, 2);
        assert_eq!(b1.answered, 1);
        assert_eq!(b1.not_answered, 1);
        assert_eq!(b1.errors, 1);
    }

    #[test]
    fn format_duration_examples() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(45.0), "45s");
        assert_eq!(format_duration(135.0), "2m 15s");
    }
}
