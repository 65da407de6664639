use time::OffsetDateTime;
use uuid::Uuid;

/// A single appointment row, immutable once parsed from the input file.
#[derive(Debug, Clone)]
pub struct Appointment {
    /// Generated identifier.  Name + timestamp is not unique (two people can
    /// share a name and a slot), so every row gets its own id at ingest.
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub appointment_time: OffsetDateTime,
    pub location: Option<String>,
    /// Row number in the source file, for warnings.
    pub row_index: usize,
}

/// Result of one call-placement attempt or status fetch.
///
/// `success` means the provider accepted the request, not that anyone
/// answered.  Subsequent status polls produce a new value rather than
/// mutating an old one.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub call_id: Option<String>,
    pub status: Option<String>,
    pub duration_secs: Option<f64>,
    pub error: Option<String>,
    pub timestamp: OffsetDateTime,
}

impl CallOutcome {
    pub fn accepted(call_id: String, status: String, duration_secs: Option<f64>) -> Self {
        Self {
            success: true,
            call_id: Some(call_id),
            status: Some(status),
            duration_secs,
            error: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            call_id: None,
            status: None,
            duration_secs: None,
            error: Some(error),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// One per-appointment row handed to the batch logger after a calling run.
#[derive(Debug, Clone)]
pub struct BatchCallRecord {
    pub name: String,
    pub phone_number: String,
    pub appointment_date: String,
    pub location: String,
    pub answered: bool,
    pub status: String,
    pub duration_secs: Option<f64>,
    pub call_id: Option<String>,
    pub user_response: String,
    pub error: Option<String>,
}

/// Running counters for a coordinator run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub calls_placed: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub appointments_processed: u64,
}
