//! End-to-end flow through the coordinator with a scripted provider:
//! scheduled-mode registration and tick-driven dispatch, plus an
//! immediate-mode batch that lands in the CSV log.

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use time::macros::datetime;
use time::Duration;
use uuid::Uuid;

use reminder_rs::batch_log::BatchLogger;
use reminder_rs::caller::{CallClient, CallProvider, ProviderError};
use reminder_rs::config::Config;
use reminder_rs::coordinator::ReminderCoordinator;
use reminder_rs::responses::ResponseStore;
use reminder_rs::twilio_types::CallResource;
use reminder_rs::types::Appointment;

struct CountingProvider {
    create_calls: AtomicU32,
}

#[async_trait]
impl CallProvider for CountingProvider {
    async fn create_call(
        &self,
        _to: &str,
        _from: &str,
        _twiml_url: &str,
        _status_callback: Option<&str>,
    ) -> Result<CallResource, ProviderError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallResource {
            sid: format!("CA{n}"),
            status: "queued".to_string(),
            duration: None,
        })
    }

    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, ProviderError> {
        Ok(CallResource {
            sid: call_sid.to_string(),
            status: "completed".to_string(),
            duration: Some("42".to_string()),
        })
    }
}

fn appointment(name: &str, at: time::OffsetDateTime) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone_number: "555-123-4567".to_string(),
        email: "someone@example.com".to_string(),
        appointment_time: at,
        location: None,
        row_index: 2,
    }
}

fn coordinator(
    dir: &tempfile::TempDir,
    provider: Arc<CountingProvider>,
    config: Config,
) -> ReminderCoordinator {
    let client = CallClient::new(provider, "+15550000000".to_string(), &config.calling);
    let batch_logger = BatchLogger::new(dir.path().join("batch.csv")).unwrap();
    let responses = ResponseStore::new(dir.path().join("responses.json"));
    ReminderCoordinator::new(config, client, batch_logger, responses)
}

#[tokio::test(start_paused = true)]
async fn scheduled_mode_dispatches_jobs_as_they_come_due() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(CountingProvider {
        create_calls: AtomicU32::new(0),
    });
    let mut coordinator = coordinator(&dir, provider.clone(), Config::default());

    // Lead hours default to 24, so these come due at T and T+24h.
    let t = datetime!(2026-03-01 12:00 UTC);
    let appointments = vec![
        appointment("First", t + Duration::hours(24)),
        appointment("Second", t + Duration::hours(48)),
    ];

    assert_eq!(coordinator.schedule_appointments(&appointments, t), 2);
    assert_eq!(coordinator.pending_jobs(), 2);

    // One tick in: only the first job is due.
    let dispatched = coordinator.dispatch_due(t + Duration::minutes(1)).await;
    assert_eq!(dispatched, 1);
    assert_eq!(coordinator.pending_jobs(), 1);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);

    // Nothing new before the second due time.
    assert_eq!(
        coordinator.dispatch_due(t + Duration::hours(12)).await,
        0
    );

    // Past T+24h the second job fires and the registry drains.
    let dispatched = coordinator
        .dispatch_due(t + Duration::hours(24) + Duration::minutes(1))
        .await;
    assert_eq!(dispatched, 1);
    assert_eq!(coordinator.pending_jobs(), 0);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 2);

    let stats = coordinator.stats();
    assert_eq!(stats.calls_placed, 2);
    assert_eq!(stats.calls_succeeded, 2);
    assert_eq!(stats.calls_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_registration_does_not_grow_the_queue() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(CountingProvider {
        create_calls: AtomicU32::new(0),
    });
    let mut coordinator = coordinator(&dir, provider, Config::default());

    let t = datetime!(2026-03-01 12:00 UTC);
    let appointments = vec![appointment("Only", t + Duration::hours(48))];

    coordinator.schedule_appointments(&appointments, t);
    coordinator.schedule_appointments(&appointments, t);
    assert_eq!(coordinator.pending_jobs(), 1);
}

#[tokio::test(start_paused = true)]
async fn immediate_mode_logs_final_statuses_to_the_batch_file() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(CountingProvider {
        create_calls: AtomicU32::new(0),
    });
    let mut coordinator = coordinator(&dir, provider.clone(), Config::default());

    let t = datetime!(2026-03-10 9:00 UTC);
    let appointments = vec![
        appointment("Jane Doe", t),
        appointment("John Roe", t + Duration::hours(3)),
    ];

    let placed = coordinator.place_calls(&appointments).await.unwrap();
    assert_eq!(placed, 2);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 2);

    let content = fs::read_to_string(dir.path().join("batch.csv")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    // Final status poll upgraded the records to completed/answered.
    assert!(lines[1].contains("Jane Doe"));
    assert!(lines[1].contains("Yes"));
    assert!(lines[1].contains("completed"));
    assert!(lines[2].contains("John Roe"));

    let stats = coordinator.stats();
    assert_eq!(stats.calls_placed, 2);
    assert_eq!(stats.calls_succeeded, 2);
    assert_eq!(stats.appointments_processed, 2);
}
