pub mod batch_log;
pub mod caller;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod phone;
pub mod responses;
pub mod scheduler;
pub mod twilio_types;
pub mod types;
pub mod utils;

pub mod consts {
    /// Pause between call acceptance and the post-dial status fetch.
    pub const POST_DIAL_DELAY_MILLIS: u64 = 2_000;

    /// Settle time before final status polling, with an interactive webhook
    /// (callees need time to listen and press a digit) and without.
    pub const SETTLE_WITH_WEBHOOK_SECS: u64 = 30;
    pub const SETTLE_NO_WEBHOOK_SECS: u64 = 10;

    /// How long a Gather waits for a digit.
    pub const GATHER_TIMEOUT_SECS: u16 = 10;

    pub const GATHER_INSTRUCTIONS: &str =
        "Press 1 to confirm your appointment, or press 2 to cancel or reschedule.";
    pub const CONFIRMED_PROMPT: &str =
        "Thank you. Your appointment is confirmed. We look forward to seeing you. Goodbye.";
    pub const CANCELLED_PROMPT: &str = "Your appointment has been cancelled. \
        Please contact us to reschedule if needed. Thank you. Goodbye.";
    pub const INVALID_PROMPT: &str = "Sorry, I didn't understand that choice.";
    pub const NO_RESPONSE_PROMPT: &str = "We didn't receive a response. Please contact us \
        if you need to confirm or reschedule your appointment. Goodbye.";
}
