//! Reminder scheduling core: a registry of pending call jobs with due-time
//! semantics.
//!
//! The scheduler decides WHEN a reminder should fire and holds jobs until
//! then; it never places a call itself.  Dispatch belongs to the
//! coordinator, which keeps the timing decision testable on its own.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

/// A call waiting for its due time.  Plain data, no embedded callback: the
/// coordinator looks jobs up by id and dispatches with its own client.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledReminderJob {
    pub appointment_id: String,
    pub phone_number: String,
    pub name: String,
    pub message: String,
    /// When the reminder call should be placed.
    pub call_time: OffsetDateTime,
    pub appointment_time: OffsetDateTime,
}

/// In-memory registry of pending reminder jobs, keyed by appointment id.
///
/// Not internally synchronized; in scheduled mode the coordinator wraps it
/// in a mutex because the periodic tick and the main thread overlap.
pub struct ReminderScheduler {
    reminder_hours_before: i64,
    jobs: HashMap<String, ScheduledReminderJob>,
}

impl ReminderScheduler {
    pub fn new(reminder_hours_before: i64) -> Self {
        info!(hours = reminder_hours_before, "initialized scheduler");
        Self {
            reminder_hours_before,
            jobs: HashMap::new(),
        }
    }

    /// Register a reminder for an appointment.  The due time is the
    /// appointment time minus the configured lead hours.
    ///
    /// Returns `None` when the due time is already in the past: stale
    /// appointments are dropped rather than fired immediately (callers that
    /// want an immediate call use immediate mode, which bypasses the
    /// scheduler entirely).  Idempotent by id: a duplicate registration
    /// returns the existing job unchanged.
    pub fn schedule_appointment(
        &mut self,
        appointment_id: &str,
        phone_number: &str,
        name: &str,
        message: &str,
        appointment_time: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Option<ScheduledReminderJob> {
        let call_time = appointment_time - Duration::hours(self.reminder_hours_before);

        if call_time < now {
            warn!(
                appointment_id,
                %call_time,
                "reminder time is in the past, skipping"
            );
            return None;
        }

        if let Some(existing) = self.jobs.get(appointment_id) {
            debug!(appointment_id, "already scheduled");
            return Some(existing.clone());
        }

        let job = ScheduledReminderJob {
            appointment_id: appointment_id.to_string(),
            phone_number: phone_number.to_string(),
            name: name.to_string(),
            message: message.to_string(),
            call_time,
            appointment_time,
        };
        self.jobs.insert(appointment_id.to_string(), job.clone());
        info!(name, %call_time, "scheduled reminder call");

        Some(job)
    }

    pub fn get_scheduled_call(&self, appointment_id: &str) -> Option<&ScheduledReminderJob> {
        self.jobs.get(appointment_id)
    }

    /// All jobs whose due time has arrived.  Non-destructive: the caller
    /// removes dispatched jobs explicitly.
    pub fn get_due_jobs(&self, now: OffsetDateTime) -> Vec<ScheduledReminderJob> {
        let mut due: Vec<ScheduledReminderJob> = self
            .jobs
            .values()
            .filter(|job| job.call_time <= now)
            .cloned()
            .collect();
        due.sort_by_key(|job| job.call_time);
        due
    }

    /// Remove a job by id.  Returns false when no such job exists.
    pub fn remove_job(&mut self, appointment_id: &str) -> bool {
        let removed = self.jobs.remove(appointment_id).is_some();
        if removed {
            info!(appointment_id, "removed scheduled call");
        }
        removed
    }

    /// The next `limit` jobs still in the future, ascending by due time.
    /// Status display only.
    pub fn get_upcoming_jobs(
        &self,
        limit: usize,
        now: OffsetDateTime,
    ) -> Vec<ScheduledReminderJob> {
        let mut upcoming: Vec<ScheduledReminderJob> = self
            .jobs
            .values()
            .filter(|job| job.call_time > now)
            .cloned()
            .collect();
        upcoming.sort_by_key(|job| job.call_time);
        upcoming.truncate(limit);
        upcoming
    }

    /// Purge jobs whose due time elapsed without being dispatched.  A
    /// maintenance operation, not a substitute for `remove_job` after
    /// dispatch.
    pub fn clear_past(&mut self, now: OffsetDateTime) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.call_time > now);
        let removed = before - self.jobs.len();
        if removed > 0 {
            info!(removed, "cleared elapsed jobs from scheduler");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.jobs.len()
    }
}
