use serde::Deserialize;

pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Pause")]
        Pause(PauseAction),
        #[xmlserde(name = b"Gather")]
        Gather(GatherAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"loop", ty = "attr")]
        pub lp: Option<u16>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    impl SayAction {
        /// The standard prompt voice used on every spoken segment.
        pub fn alice(text: impl Into<String>) -> Self {
            Self {
                text: text.into(),
                voice: Some("alice".to_string()),
                language: Some("en-US".to_string()),
                ..Default::default()
            }
        }
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct PauseAction {
        #[xmlserde(name = b"length", ty = "attr")]
        pub length: Option<u16>,
    }

    /// Twilio Gather verb: collect DTMF digits during a spoken prompt and
    /// post them back to `action`.
    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct GatherAction {
        #[xmlserde(name = b"numDigits", ty = "attr")]
        pub num_digits: Option<u16>,
        #[xmlserde(name = b"timeout", ty = "attr")]
        pub timeout: Option<u16>,
        #[xmlserde(name = b"action", ty = "attr")]
        pub action: Option<String>,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<String>,
        #[xmlserde(name = b"Say", ty = "child")]
        pub says: Vec<SayAction>,
    }
}
pub use twiml::*;

mod rest {
    use serde::Deserialize;

    /// Subset of the Twilio call resource we care about, as returned by the
    /// `Calls` REST endpoints.
    #[derive(Deserialize, Debug, Clone)]
    pub struct CallResource {
        pub sid: String,
        pub status: String,
        /// Twilio reports duration as a decimal string, absent until the
        /// call has progressed.
        pub duration: Option<String>,
    }

    impl CallResource {
        pub fn duration_secs(&self) -> Option<f64> {
            self.duration.as_deref().and_then(|d| d.parse().ok())
        }
    }

    /// Error document Twilio returns alongside a non-2xx status.
    #[derive(Deserialize, Debug)]
    pub struct ApiErrorBody {
        pub message: Option<String>,
        pub code: Option<i64>,
    }
}
pub use rest::*;

/// Form/query payload Twilio sends to the voice webhook.  Present on both the
/// initial fetch (with `message`) and the Gather post-back (with `Digits`).
#[derive(Deserialize, Debug, Default)]
pub struct VoicePayload {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
    #[serde(rename = "CallerName")]
    pub caller_name: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

/// Status-callback payload posted by Twilio as a call progresses.
#[derive(Deserialize, Debug)]
pub struct StatusCallbackPayload {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: CallStatus,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
}
