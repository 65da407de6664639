//! Appointment ingestion from CSV files.
//!
//! Required columns: `name`, `phone_number`, `email`, `appointment_date`;
//! `location` is optional.  Bad rows are skipped with a warning; the load
//! fails as a whole only when the file is unreadable or a required column
//! is missing entirely.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::format_description::{self, OwnedFormatItem};
use time::macros::format_description as fd;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DataConfig;
use crate::error::{ReminderError, Result};
use crate::types::Appointment;
use crate::utils::csv_split;

const REQUIRED_COLUMNS: &[&str] = &["name", "phone_number", "email", "appointment_date"];

/// Reads and validates appointment rows from a CSV file.
pub struct AppointmentReader {
    date_format: OwnedFormatItem,
    fallback_date_format: OwnedFormatItem,
}

impl AppointmentReader {
    pub fn new(cfg: &DataConfig) -> Result<Self> {
        Ok(Self {
            date_format: parse_format(&cfg.date_format)?,
            fallback_date_format: parse_format(&cfg.fallback_date_format)?,
        })
    }

    /// Load all parseable appointments from `path`.
    pub fn read_csv(&self, path: impl AsRef<Path>) -> Result<Vec<Appointment>> {
        let path = path.as_ref();
        info!(path = %path.display(), "reading appointment file");

        let content = fs::read_to_string(path).map_err(|e| {
            ReminderError::Ingest(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut lines = content.lines();

        let header = lines
            .next()
            .ok_or_else(|| ReminderError::Ingest("appointment file is empty".to_string()))?;
        let columns = column_index(header)?;
        debug!(?columns, "columns found");

        let mut appointments = Vec::new();
        // Data starts on file line 2.
        for (idx, line) in lines.enumerate() {
            let row_index = idx + 2;
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_row(line, &columns, row_index) {
                Some(appointment) => appointments.push(appointment),
                None => warn!(row = row_index, "skipping unparseable row"),
            }
        }

        info!(count = appointments.len(), "parsed appointments");
        Ok(appointments)
    }

    fn parse_row(
        &self,
        line: &str,
        columns: &HashMap<String, usize>,
        row_index: usize,
    ) -> Option<Appointment> {
        let fields = csv_split(line);
        let get = |name: &str| -> String {
            columns
                .get(name)
                .and_then(|&i| fields.get(i))
                .map(|f| f.trim().to_string())
                .unwrap_or_default()
        };

        let name = get("name");
        let phone_number = get("phone_number");
        let email = get("email");
        if name.is_empty() || phone_number.is_empty() || email.is_empty() {
            warn!(row = row_index, "missing required fields");
            return None;
        }

        let raw_date = get("appointment_date");
        let appointment_time = match self.parse_datetime(&raw_date) {
            Some(dt) => dt,
            None => {
                warn!(row = row_index, value = %raw_date, "could not parse appointment date");
                return None;
            }
        };

        let location = Some(get("location")).filter(|l| !l.is_empty());

        Some(Appointment {
            id: Uuid::new_v4(),
            name,
            phone_number,
            email,
            appointment_time,
            location,
            row_index,
        })
    }

    /// Parse a timestamp under the primary format, the fallback format, or
    /// a flexible last resort (RFC 3339, `T`-separated, date-only at
    /// midnight).  Naive timestamps are taken as UTC.
    fn parse_datetime(&self, value: &str) -> Option<OffsetDateTime> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(dt) = PrimitiveDateTime::parse(value, &self.date_format) {
            return Some(dt.assume_utc());
        }
        if let Ok(dt) = PrimitiveDateTime::parse(value, &self.fallback_date_format) {
            return Some(dt.assume_utc());
        }
        if let Ok(dt) = OffsetDateTime::parse(value, &Rfc3339) {
            return Some(dt);
        }
        if let Ok(dt) =
            PrimitiveDateTime::parse(value, fd!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        {
            return Some(dt.assume_utc());
        }
        if let Ok(date) = Date::parse(value, fd!("[year]-[month]-[day]")) {
            return Some(date.midnight().assume_utc());
        }
        None
    }
}

fn parse_format(fmt: &str) -> Result<OwnedFormatItem> {
    format_description::parse_owned::<2>(fmt)
        .map_err(|e| ReminderError::Config(format!("invalid date format '{fmt}': {e}")))
}

/// Map normalized (lowercased, trimmed) column names to their positions,
/// failing when a required column is absent.
fn column_index(header: &str) -> Result<HashMap<String, usize>> {
    let columns: HashMap<String, usize> = csv_split(header)
        .iter()
        .enumerate()
        .map(|(i, c)| (c.trim().to_lowercase(), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.contains_key(**c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ReminderError::Ingest(format!(
            "missing required columns: {missing:?}"
        )));
    }
    Ok(columns)
}
