//! Call placement through the Twilio REST API, with bounded retry and
//! failure classification.

use crate::config::CallingConfig;
use crate::phone;
use crate::twilio_types::{ApiErrorBody, CallResource};
use crate::types::CallOutcome;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Statuses that count as "answered" for reporting purposes.  Compared
/// case-insensitively against whatever the provider reports.
const ANSWERED_STATUSES: &[&str] = &["completed", "answered", "in-progress"];

/// True when the provider-reported status indicates the call was picked up.
pub fn is_answered(status: Option<&str>) -> bool {
    match status {
        Some(s) => ANSWERED_STATUSES.contains(&s.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Provider-side failure, split by retry policy: an API error document means
/// Twilio handled and rejected the request (worth retrying); a transport
/// error means the request never completed normally (abort immediately).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Twilio API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}

/// Boundary to the telephony provider.  Kept as a trait so the retry and
/// outcome logic can be exercised against a scripted provider in tests.
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// Ask the provider to dial `to` and fetch call instructions from
    /// `twiml_url` once the callee picks up.
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        twiml_url: &str,
        status_callback: Option<&str>,
    ) -> Result<CallResource, ProviderError>;

    /// Fetch the live state of a previously created call.
    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, ProviderError>;
}

/// Twilio REST implementation of [`CallProvider`].
pub struct TwilioProvider {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl TwilioProvider {
    pub fn new(http_client: reqwest::Client, account_sid: String, auth_token: String) -> Self {
        Self {
            http_client,
            account_sid,
            auth_token,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls/{}.json",
            self.account_sid, call_sid
        )
    }

    async fn decode_call(&self, resp: reqwest::Response) -> Result<CallResource, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<ApiErrorBody>().await.ok();
            let message = body
                .and_then(|b| b.message)
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<CallResource>()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

#[async_trait]
impl CallProvider for TwilioProvider {
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        twiml_url: &str,
        status_callback: Option<&str>,
    ) -> Result<CallResource, ProviderError> {
        let mut form = vec![
            ("To", to),
            ("From", from),
            ("Url", twiml_url),
            ("Method", "GET"),
        ];
        if let Some(callback) = status_callback {
            form.push(("StatusCallback", callback));
            form.push(("StatusCallbackMethod", "POST"));
        }

        let resp = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        self.decode_call(resp).await
    }

    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, ProviderError> {
        let resp = self
            .http_client
            .get(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        self.decode_call(resp).await
    }
}

/// Places reminder calls with phone-number normalization, linear-backoff
/// retry, and post-dial status tracking.
pub struct CallClient {
    provider: Arc<dyn CallProvider>,
    from_number: String,
    max_retries: u32,
    retry_delay: Duration,
    post_dial_delay: Duration,
    webhook_url: Option<String>,
    twiml_fallback_url: String,
    status_callback_url: Option<String>,
}

impl CallClient {
    pub fn new(provider: Arc<dyn CallProvider>, from_number: String, cfg: &CallingConfig) -> Self {
        info!(from = %from_number, "initialized call client");
        Self {
            provider,
            from_number,
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_secs(cfg.retry_delay_seconds),
            post_dial_delay: Duration::from_millis(crate::consts::POST_DIAL_DELAY_MILLIS),
            webhook_url: cfg.webhook_url.clone(),
            twiml_fallback_url: cfg.twiml_fallback_url.clone(),
            status_callback_url: cfg.status_callback_url.clone(),
        }
    }

    pub fn has_webhook(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Voice-instruction URL for a call: the interactive webhook when one is
    /// configured, otherwise the statically hosted instructions function.
    /// The message rides along URL-escaped either way.
    fn twiml_url(&self, message: &str) -> String {
        let query = serde_urlencoded::to_string([("message", message)]).unwrap_or_default();
        match &self.webhook_url {
            Some(base) => format!("{}/voice?{query}", base.trim_end_matches('/')),
            None => format!("{}?{query}", self.twiml_fallback_url),
        }
    }

    /// Place a call, retrying API-level failures up to `max_retries` times
    /// with a constant delay.  `success` on the returned outcome means the
    /// provider accepted the request, not that the call was answered.
    pub async fn place_call(
        &self,
        to_number: &str,
        message: &str,
        allow_retry: bool,
    ) -> CallOutcome {
        let to_number = phone::normalize(to_number);
        if phone::is_unparseable(&to_number) {
            warn!(to = %to_number, "could not normalize phone number, dialing as-is");
        }
        info!(to = %to_number, "placing call");
        debug!(message, "call message");

        let twiml_url = self.twiml_url(message);
        let mut attempt: u32 = 0;
        let last_error: String;

        loop {
            match self
                .provider
                .create_call(
                    &to_number,
                    &self.from_number,
                    &twiml_url,
                    self.status_callback_url.as_deref(),
                )
                .await
            {
                Ok(created) => {
                    // Give the call a moment to start dialing, then report
                    // the state just after acceptance.  A failed refresh is
                    // not a failed call; fall back to the creation snapshot.
                    tokio::time::sleep(self.post_dial_delay).await;
                    let current = match self.provider.fetch_call(&created.sid).await {
                        Ok(fetched) => fetched,
                        Err(e) => {
                            warn!(error = %e, sid = %created.sid, "post-dial status fetch failed");
                            created
                        }
                    };
                    info!(sid = %current.sid, status = %current.status, "call placed");
                    return CallOutcome::accepted(
                        current.sid.clone(),
                        current.status.clone(),
                        current.duration_secs(),
                    );
                }
                Err(e) if e.is_retryable() && allow_retry && attempt < self.max_retries => {
                    error!(error = %e, attempt = attempt + 1, "Twilio error placing call");
                    info!(delay_secs = self.retry_delay.as_secs(), "retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, "failed to place call");
                    last_error = e.to_string();
                    break;
                }
            }
        }

        error!(to = %to_number, attempts = attempt + 1, "all call attempts failed");
        CallOutcome::failed(last_error)
    }

    /// Live status of a previously placed call.  Provider errors are logged
    /// and collapse to `None`; they never surface to the caller.
    pub async fn get_call_status(&self, call_sid: &str) -> Option<CallOutcome> {
        match self.provider.fetch_call(call_sid).await {
            Ok(call) => Some(CallOutcome {
                success: is_answered(Some(&call.status)),
                call_id: Some(call.sid.clone()),
                status: Some(call.status.clone()),
                duration_secs: call.duration_secs(),
                error: None,
                timestamp: time::OffsetDateTime::now_utc(),
            }),
            Err(e) => {
                error!(error = %e, call_sid, "error fetching call status");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallingConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails the first `failures` create attempts with an API
    /// error, then succeeds.
    struct ScriptedProvider {
        failures: u32,
        create_calls: AtomicU32,
        fetch_calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn failing(failures: u32) -> Self {
            Self {
                failures,
                create_calls: AtomicU32::new(0),
                fetch_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CallProvider for ScriptedProvider {
        async fn create_call(
            &self,
            _to: &str,
            _from: &str,
            _twiml_url: &str,
            _status_callback: Option<&str>,
        ) -> Result<CallResource, ProviderError> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ProviderError::Api {
                    status: 503,
                    message: "service unavailable".to_string(),
                })
            } else {
                Ok(CallResource {
                    sid: "CA123".to_string(),
                    status: "queued".to_string(),
                    duration: None,
                })
            }
        }

        async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, ProviderError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(CallResource {
                sid: call_sid.to_string(),
                status: "in-progress".to_string(),
                duration: Some("4".to_string()),
            })
        }
    }

    /// Provider whose create always transport-fails.
    struct BrokenTransport {
        create_calls: AtomicU32,
    }

    #[async_trait]
    impl CallProvider for BrokenTransport {
        async fn create_call(
            &self,
            _to: &str,
            _from: &str,
            _twiml_url: &str,
            _status_callback: Option<&str>,
        ) -> Result<CallResource, ProviderError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transport("connection reset".to_string()))
        }

        async fn fetch_call(&self, _call_sid: &str) -> Result<CallResource, ProviderError> {
            unreachable!("no call is ever created")
        }
    }

    fn client(provider: Arc<dyn CallProvider>, max_retries: u32) -> CallClient {
        let cfg = CallingConfig {
            max_retries,
            retry_delay_seconds: 0,
            ..Default::default()
        };
        let mut client = CallClient::new(provider, "+15550000000".to_string(), &cfg);
        client.post_dial_delay = Duration::ZERO;
        client
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_within_retry_budget() {
        let provider = Arc::new(ScriptedProvider::failing(2));
        let client = client(provider.clone(), 3);

        let outcome = client.place_call("555-123-4567", "hello", true).await;

        assert!(outcome.success);
        assert_eq!(outcome.call_id.as_deref(), Some("CA123"));
        assert_eq!(outcome.status.as_deref(), Some("in-progress"));
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn always_failing_provider_exhausts_retries() {
        let provider = Arc::new(ScriptedProvider::failing(u32::MAX));
        let client = client(provider.clone(), 2);

        let outcome = client.place_call("+15551234567", "hello", true).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("service unavailable"));
        // 1 initial + 2 retries.
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_disabled_gives_single_attempt() {
        let provider = Arc::new(ScriptedProvider::failing(u32::MAX));
        let client = client(provider.clone(), 3);

        let outcome = client.place_call("+15551234567", "hello", false).await;

        assert!(!outcome.success);
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_error_aborts_without_retry() {
        let provider = Arc::new(BrokenTransport {
            create_calls: AtomicU32::new(0),
        });
        let client = client(provider.clone(), 3);

        let outcome = client.place_call("+15551234567", "hello", true).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_fetch_maps_to_outcome() {
        let provider = Arc::new(ScriptedProvider::failing(0));
        let client = client(provider, 3);

        let outcome = client.get_call_status("CA123").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.status.as_deref(), Some("in-progress"));
        assert_eq!(outcome.duration_secs, Some(4.0));
    }

    #[test]
    fn answered_statuses_are_case_insensitive() {
        assert!(is_answered(Some("Completed")));
        assert!(is_answered(Some("IN-PROGRESS")));
        assert!(is_answered(Some("answered")));
        assert!(!is_answered(Some("busy")));
        assert!(!is_answered(Some("no-answer")));
        assert!(!is_answered(None));
    }

    #[test]
    fn webhook_url_gets_voice_subpath_and_escaped_message() {
        let provider: Arc<dyn CallProvider> = Arc::new(ScriptedProvider::failing(0));
        let cfg = CallingConfig {
            webhook_url: Some("https://example.ngrok.io/".to_string()),
            ..Default::default()
        };
        let client = CallClient::new(provider, "+15550000000".to_string(), &cfg);

        let url = client.twiml_url("Hello Jane, see you at 2:30 PM");
        assert!(url.starts_with("https://example.ngrok.io/voice?message="));
        assert!(!url.contains(' '));
    }

    #[test]
    fn fallback_url_is_used_without_webhook() {
        let provider: Arc<dyn CallProvider> = Arc::new(ScriptedProvider::failing(0));
        let cfg = CallingConfig::default();
        let client = CallClient::new(provider, "+15550000000".to_string(), &cfg);

        let url = client.twiml_url("hi");
        assert!(url.starts_with(&cfg.twiml_fallback_url));
        assert!(url.ends_with("message=hi"));
    }
}
