use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use reminder_rs::batch_log::BatchLogger;
use reminder_rs::caller::{CallClient, TwilioProvider};
use reminder_rs::config::{Config, TwilioCredentials};
use reminder_rs::coordinator::ReminderCoordinator;
use reminder_rs::error::Result;
use reminder_rs::handlers::{self, WebState};
use reminder_rs::ingest::AppointmentReader;
use reminder_rs::responses::ResponseStore;

/// Automated appointment reminder calls via Twilio.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// CSV file with appointment rows.
    appointments_file: PathBuf,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config/settings.yaml")]
    config: PathBuf,

    /// Register reminders with the scheduler instead of calling everyone
    /// now.
    #[arg(long)]
    schedule: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("reminder_rs", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("appointment reminder system starting");

    let config = Config::load(&cli.config)?;
    let credentials = TwilioCredentials::from_env()?;

    let provider = Arc::new(TwilioProvider::new(
        reqwest::Client::new(),
        credentials.account_sid,
        credentials.auth_token,
    ));
    let client = CallClient::new(provider, credentials.phone_number, &config.calling);
    if let Some(url) = &config.calling.webhook_url {
        info!(webhook = %url, "configured interactive webhook");
    }

    let batch_logger = BatchLogger::new(&config.logging.batch_log_file)?;
    let responses = ResponseStore::new(&config.logging.responses_file);

    let reader = AppointmentReader::new(&config.data)?;
    let appointments = reader.read_csv(&cli.appointments_file)?;
    if appointments.is_empty() {
        info!("no appointments found");
        return Ok(());
    }

    // The webhook server only matters while this process is placing or
    // awaiting calls, so it runs as a sibling task.
    if config.calling.webhook_url.is_some() {
        let state = Arc::new(WebState {
            responses: responses.clone(),
        });
        let addr = config
            .server
            .bind_addr
            .parse()
            .map_err(|e| reminder_rs::error::ReminderError::Config(format!("bad bind_addr: {e}")))?;
        let app = handlers::router(state);
        info!(%addr, "starting webhook server");
        tokio::spawn(async move {
            if let Err(e) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
                error!(error = %e, "webhook server failed");
            }
        });
    }

    let mut coordinator = ReminderCoordinator::new(config.clone(), client, batch_logger, responses);

    let scheduled_mode = cli.schedule && !config.scheduling.call_immediately;
    if scheduled_mode {
        coordinator.run_scheduled(&appointments).await?;
    } else {
        coordinator.place_calls(&appointments).await?;
        coordinator.log_statistics();
    }

    info!("application completed");
    Ok(())
}
