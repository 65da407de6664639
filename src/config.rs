//! YAML application configuration plus environment-sourced credentials.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{ReminderError, Result};

/// Application configuration, loaded from a YAML settings file.  Every field
/// has a default so a sparse file (or `Config::default()`) is usable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    #[serde(default)]
    pub calling: CallingConfig,

    #[serde(default)]
    pub message: MessageConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Hours before an appointment at which its reminder call is placed.
    #[serde(default = "default_reminder_hours")]
    pub reminder_hours_before: i64,

    /// Minutes between due-job checks in scheduled mode.
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,

    /// Call every loaded appointment immediately instead of scheduling.
    #[serde(default)]
    pub call_immediately: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallingConfig {
    /// Retry attempts after the initial placement fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Constant delay between retries (linear backoff).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,

    /// Base URL of the interactive voice webhook, when one is running.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Where Twilio posts call lifecycle updates.
    #[serde(default)]
    pub status_callback_url: Option<String>,

    /// Statically hosted instructions function used when no webhook is
    /// configured.
    #[serde(default = "default_twiml_fallback")]
    pub twiml_fallback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Primary appointment timestamp format (time crate syntax).
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Fallback timestamp format tried when the primary fails.
    #[serde(default = "default_fallback_date_format")]
    pub fallback_date_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_batch_log_file")]
    pub batch_log_file: String,

    #[serde(default = "default_responses_file")]
    pub responses_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the webhook server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_reminder_hours() -> i64 {
    24
}

fn default_check_interval() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    300
}

fn default_twiml_fallback() -> String {
    "https://appointmentreminder-1291.twil.io/path_1".to_string()
}

fn default_message_template() -> String {
    "Hello {name}, this is an automated reminder that you have an appointment \
     scheduled for {appointment_date} at {appointment_time}{location_text}. \
     If you need to reschedule, please contact us. Thank you."
        .to_string()
}

fn default_date_format() -> String {
    "[year]-[month]-[day] [hour]:[minute]".to_string()
}

fn default_fallback_date_format() -> String {
    "[month]/[day]/[year] [hour]:[minute]".to_string()
}

fn default_batch_log_file() -> String {
    "logs/batch_call_results.csv".to_string()
}

fn default_responses_file() -> String {
    "logs/webhook_responses.json".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            reminder_hours_before: default_reminder_hours(),
            check_interval_minutes: default_check_interval(),
            call_immediately: false,
        }
    }
}

impl Default for CallingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay(),
            webhook_url: None,
            status_callback_url: None,
            twiml_fallback_url: default_twiml_fallback(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            message_template: default_message_template(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            fallback_date_format: default_fallback_date_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            batch_log_file: default_batch_log_file(),
            responses_file: default_responses_file(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.  A missing or malformed file is
    /// an error; callers wanting built-in defaults use `Config::default()`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ReminderError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| ReminderError::Config(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Twilio credentials, sourced from the environment (optionally via `.env`).
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
}

impl TwilioCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account_sid: require_env("TWILIO_ACCOUNT_SID")?,
            auth_token: require_env("TWILIO_AUTH_TOKEN")?,
            phone_number: require_env("TWILIO_PHONE_NUMBER")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| ReminderError::Config(format!("{name} not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.scheduling.reminder_hours_before, 24);
        assert_eq!(cfg.scheduling.check_interval_minutes, 60);
        assert!(!cfg.scheduling.call_immediately);
        assert_eq!(cfg.calling.max_retries, 3);
        assert_eq!(cfg.calling.retry_delay_seconds, 300);
        assert!(cfg.calling.webhook_url.is_none());
        assert!(cfg.message.message_template.contains("{name}"));
    }

    #[test]
    fn partial_sections_keep_sibling_defaults() {
        let yaml = r#"
scheduling:
  reminder_hours_before: 48
calling:
  webhook_url: "https://example.ngrok.io"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduling.reminder_hours_before, 48);
        assert_eq!(cfg.scheduling.check_interval_minutes, 60);
        assert_eq!(
            cfg.calling.webhook_url.as_deref(),
            Some("https://example.ngrok.io")
        );
        assert_eq!(cfg.calling.max_retries, 3);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = Config::load("does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, ReminderError::Config(_)));
    }
}
