//! Orchestration of reminder calls: immediate batch calling and
//! scheduler-driven dispatch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::batch_log::BatchLogger;
use crate::caller::{is_answered, CallClient};
use crate::config::Config;
use crate::consts::{SETTLE_NO_WEBHOOK_SECS, SETTLE_WITH_WEBHOOK_SECS};
use crate::error::Result;
use crate::responses::ResponseStore;
use crate::scheduler::ReminderScheduler;
use crate::types::{Appointment, BatchCallRecord, RunStats};

/// Fill the message template for one appointment.  `{location_text}`
/// renders as `, at the <location>`, or as nothing when the location is
/// empty, leaving no placeholder artifact either way.
pub fn render_message(template: &str, appointment: &Appointment) -> Result<String> {
    let date = appointment
        .appointment_time
        .format(format_description!("[month repr:long] [day], [year]"))?;
    let time_of_day = appointment
        .appointment_time
        .format(format_description!("[hour repr:12]:[minute] [period]"))?;
    let location = appointment.location.clone().unwrap_or_default();
    let location_text = if location.is_empty() {
        String::new()
    } else {
        format!(", at the {location}")
    };

    Ok(template
        .replace("{name}", &appointment.name)
        .replace("{appointment_date}", &date)
        .replace("{appointment_time}", &time_of_day)
        .replace("{location_text}", &location_text)
        .replace("{location}", &location))
}

/// Ties the pieces together: renders messages, registers jobs with the
/// scheduler, drives the periodic due check, and invokes the call client.
pub struct ReminderCoordinator {
    config: Config,
    client: CallClient,
    scheduler: Arc<Mutex<ReminderScheduler>>,
    batch_logger: BatchLogger,
    responses: ResponseStore,
    stats: RunStats,
}

impl ReminderCoordinator {
    pub fn new(
        config: Config,
        client: CallClient,
        batch_logger: BatchLogger,
        responses: ResponseStore,
    ) -> Self {
        let scheduler = Arc::new(Mutex::new(ReminderScheduler::new(
            config.scheduling.reminder_hours_before,
        )));
        Self {
            config,
            client,
            scheduler,
            batch_logger,
            responses,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn pending_jobs(&self) -> usize {
        self.scheduler.lock().unwrap().count()
    }

    /// Immediate mode: call every appointment once, in order, then settle
    /// and log the enriched batch.  Per-appointment failures are recorded
    /// and never abort the batch.
    pub async fn place_calls(&mut self, appointments: &[Appointment]) -> Result<u64> {
        info!(count = appointments.len(), "placing calls now");
        let batch_id = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;

        let mut records = Vec::new();
        let mut calls_placed: u64 = 0;

        for appointment in appointments {
            let message = match render_message(&self.config.message.message_template, appointment)
            {
                Ok(message) => message,
                Err(e) => {
                    error!(name = %appointment.name, error = %e, "error processing appointment");
                    continue;
                }
            };

            info!(name = %appointment.name, "placing call");
            let outcome = self
                .client
                .place_call(&appointment.phone_number, &message, true)
                .await;

            self.stats.calls_placed += 1;
            if outcome.success {
                self.stats.calls_succeeded += 1;
                info!(name = %appointment.name, status = ?outcome.status, "call successful");
            } else {
                self.stats.calls_failed += 1;
                error!(name = %appointment.name, error = ?outcome.error, "call failed");
            }

            let user_response = outcome
                .call_id
                .as_deref()
                .filter(|_| self.client.has_webhook())
                .and_then(|sid| self.responses.get(sid))
                .map(|entry| entry.response)
                .unwrap_or_default();

            records.push(BatchCallRecord {
                name: appointment.name.clone(),
                phone_number: appointment.phone_number.clone(),
                appointment_date: appointment.appointment_time.format(&Rfc3339)?,
                location: appointment.location.clone().unwrap_or_default(),
                answered: is_answered(outcome.status.as_deref()),
                status: outcome
                    .status
                    .clone()
                    .unwrap_or_else(|| "error".to_string()),
                duration_secs: outcome.duration_secs,
                call_id: outcome.call_id.clone(),
                user_response,
                error: outcome.error.clone(),
            });
            calls_placed += 1;
        }

        if !records.is_empty() {
            self.finalize_batch(&batch_id, &mut records).await?;
        }

        self.stats.appointments_processed += calls_placed;
        info!(calls_placed, "placed calls");
        Ok(calls_placed)
    }

    /// Wait out the settle delay, refresh each record with the call's final
    /// status and any keypad response, then hand the batch to the logger.
    async fn finalize_batch(
        &mut self,
        batch_id: &str,
        records: &mut [BatchCallRecord],
    ) -> Result<()> {
        let webhook = self.client.has_webhook();
        let wait_secs = if webhook {
            SETTLE_WITH_WEBHOOK_SECS
        } else {
            SETTLE_NO_WEBHOOK_SECS
        };
        info!(wait_secs, webhook, "waiting for calls to complete before logging final results");
        tokio::time::sleep(Duration::from_secs(wait_secs)).await;

        for record in records.iter_mut() {
            let Some(call_id) = record.call_id.clone() else {
                continue;
            };
            if record.error.is_some() {
                continue;
            }

            match self.client.get_call_status(&call_id).await {
                Some(current) => {
                    debug!(
                        name = %record.name,
                        from = %record.status,
                        to = ?current.status,
                        "updated final call status"
                    );
                    if let Some(status) = current.status {
                        record.answered = is_answered(Some(&status));
                        record.status = status;
                    }
                    record.duration_secs = current.duration_secs;
                }
                None => warn!(name = %record.name, call_id = %call_id, "could not fetch final status"),
            }

            if webhook {
                if let Some(entry) = self.responses.get(&call_id) {
                    if !entry.response.is_empty() {
                        info!(name = %record.name, response = %entry.response, "user response recorded");
                        record.user_response = entry.response;
                    }
                }
            }
        }

        self.batch_logger.log_batch(batch_id, records)?;
        Ok(())
    }

    /// Register appointments with the scheduler.  Returns how many were
    /// actually scheduled (stale ones are dropped by the scheduler).
    pub fn schedule_appointments(
        &mut self,
        appointments: &[Appointment],
        now: OffsetDateTime,
    ) -> usize {
        let template = self.config.message.message_template.clone();
        let mut scheduler = self.scheduler.lock().unwrap();
        let mut scheduled = 0;

        for appointment in appointments {
            let message = match render_message(&template, appointment) {
                Ok(message) => message,
                Err(e) => {
                    error!(name = %appointment.name, error = %e, "error rendering message");
                    continue;
                }
            };
            if scheduler
                .schedule_appointment(
                    &appointment.id.to_string(),
                    &appointment.phone_number,
                    &appointment.name,
                    &message,
                    appointment.appointment_time,
                    now,
                )
                .is_some()
            {
                scheduled += 1;
            }
        }
        scheduled
    }

    /// One scheduled-mode tick: place a call for every due job and remove
    /// it from the scheduler whether or not the call succeeded.  A failed
    /// dispatch is terminal; the client's retry already covered transients.
    pub async fn dispatch_due(&mut self, now: OffsetDateTime) -> usize {
        let due = { self.scheduler.lock().unwrap().get_due_jobs(now) };
        if due.is_empty() {
            return 0;
        }
        info!(count = due.len(), "dispatching due reminder calls");

        let mut dispatched = 0;
        for job in due {
            let outcome = self
                .client
                .place_call(&job.phone_number, &job.message, true)
                .await;

            self.stats.calls_placed += 1;
            if outcome.success {
                self.stats.calls_succeeded += 1;
                info!(name = %job.name, status = ?outcome.status, "reminder call placed");
            } else {
                self.stats.calls_failed += 1;
                error!(name = %job.name, error = ?outcome.error, "reminder call failed");
            }

            self.scheduler.lock().unwrap().remove_job(&job.appointment_id);
            dispatched += 1;
        }
        self.stats.appointments_processed += dispatched as u64;
        dispatched
    }

    /// Scheduled mode: register everything, then check for due jobs every
    /// check interval.  The first check happens immediately on startup.
    pub async fn run_scheduled(&mut self, appointments: &[Appointment]) -> Result<()> {
        let scheduled = self.schedule_appointments(appointments, OffsetDateTime::now_utc());
        info!(
            scheduled,
            pending = self.pending_jobs(),
            "registered appointments with scheduler"
        );

        let period = Duration::from_secs(self.config.scheduling.check_interval_minutes * 60);
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            let dispatched = self.dispatch_due(OffsetDateTime::now_utc()).await;
            debug!(dispatched, pending = self.pending_jobs(), "scheduler tick complete");
        }
    }

    pub fn log_statistics(&self) {
        info!(
            calls_placed = self.stats.calls_placed,
            calls_succeeded = self.stats.calls_succeeded,
            calls_failed = self.stats.calls_failed,
            appointments_processed = self.stats.appointments_processed,
            "run statistics"
        );
    }
}
