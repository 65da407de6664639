use crate::consts::{
    CANCELLED_PROMPT, CONFIRMED_PROMPT, GATHER_INSTRUCTIONS, GATHER_TIMEOUT_SECS, INVALID_PROMPT,
    NO_RESPONSE_PROMPT,
};
use crate::responses::{ResponseEntry, ResponseStore};
use crate::twilio_types::{
    wrap_twiml, GatherAction, PauseAction, Response, ResponseAction, SayAction,
    StatusCallbackPayload, VoicePayload,
};

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub struct WebState {
    pub responses: ResponseStore,
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/voice", get(voice_handler).post(voice_handler))
        .route("/status", post(status_handler))
        .with_state(state)
}

/// Voice webhook: speaks the reminder on the initial fetch and handles the
/// Gather digit post-back (1=confirm, 2=cancel, anything else=reprompt
/// once).  Twilio expects TwiML and a 200 in every case.
pub async fn voice_handler(
    method: Method,
    State(state): State<Arc<WebState>>,
    RawQuery(query): RawQuery,
    body: String,
) -> impl IntoResponse {
    let raw = if body.trim().is_empty() {
        query.unwrap_or_default()
    } else {
        body
    };
    trace!(payload = %raw, "voice request");
    let payload = match serde_urlencoded::from_str::<VoicePayload>(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "failed to deserialize voice payload");
            VoicePayload::default()
        }
    };

    xml_response(voice_twiml(&payload, &method, &state.responses))
}

/// Build the TwiML for one voice webhook request.  Separated from the
/// handler so the digit handling is testable without an HTTP stack.
fn voice_twiml(payload: &VoicePayload, method: &Method, store: &ResponseStore) -> String {
    let call_sid = payload.call_sid.clone().unwrap_or_else(|| "unknown".to_string());
    let caller_name = payload.caller_name.clone().unwrap_or_default();

    let mut actions = Vec::new();
    if let Some(digits) = &payload.digits {
        info!(%call_sid, digits = %digits, "received digit input");
        match digits.as_str() {
            "1" => {
                store_response(store, &call_sid, &caller_name, "confirmed");
                info!(%call_sid, "appointment confirmed");
                actions.push(ResponseAction::Say(SayAction::alice(CONFIRMED_PROMPT)));
            }
            "2" => {
                store_response(store, &call_sid, &caller_name, "cancelled");
                info!(%call_sid, "appointment cancelled");
                actions.push(ResponseAction::Say(SayAction::alice(CANCELLED_PROMPT)));
            }
            other => {
                warn!(%call_sid, digits = %other, "invalid digit received");
                store_response(store, &call_sid, &caller_name, &format!("invalid_{other}"));
                actions.push(ResponseAction::Say(SayAction::alice(INVALID_PROMPT)));
                actions.push(ResponseAction::Gather(gather_prompt()));
                actions.push(ResponseAction::Say(SayAction::alice(NO_RESPONSE_PROMPT)));
            }
        }
    } else if method == Method::POST {
        // Gather timeout: Twilio posts back without Digits.
        info!(%call_sid, "gather timed out without input");
        store_response(store, &call_sid, &caller_name, "timeout");
        actions.push(ResponseAction::Say(SayAction::alice(NO_RESPONSE_PROMPT)));
    } else {
        let message = payload.message.clone().unwrap_or_default();
        info!(%call_sid, message_len = message.len(), "initial call received");
        if !message.is_empty() {
            actions.push(ResponseAction::Say(SayAction::alice(message)));
        }
        actions.push(ResponseAction::Pause(PauseAction { length: Some(1) }));
        actions.push(ResponseAction::Gather(gather_prompt()));
        actions.push(ResponseAction::Say(SayAction::alice(NO_RESPONSE_PROMPT)));
    }

    wrap_twiml(xmlserde::xml_serialize(Response { actions }))
}

fn gather_prompt() -> GatherAction {
    GatherAction {
        num_digits: Some(1),
        timeout: Some(GATHER_TIMEOUT_SECS),
        action: Some("/voice".to_string()),
        method: Some("POST".to_string()),
        says: vec![SayAction::alice(GATHER_INSTRUCTIONS)],
    }
}

fn store_response(store: &ResponseStore, call_sid: &str, name: &str, response: &str) {
    let entry = ResponseEntry {
        name: name.to_string(),
        response: response.to_string(),
    };
    if let Err(e) = store.put(call_sid, entry) {
        error!(error = %e, %call_sid, "error saving call response");
    }
}

/// Status callback: log the lifecycle update and acknowledge with an empty
/// TwiML document.
pub async fn status_handler(body: String) -> impl IntoResponse {
    match serde_urlencoded::from_str::<StatusCallbackPayload>(&body) {
        Ok(payload) => debug!(
            call_sid = %payload.call_sid,
            status = ?payload.call_status,
            duration = ?payload.call_duration,
            "call status update"
        ),
        Err(e) => error!(error = %e, "failed to deserialize status callback"),
    }
    xml_response(wrap_twiml(xmlserde::xml_serialize(Response {
        actions: Vec::new(),
    })))
}

fn xml_response(twiml: String) -> (StatusCode, HeaderMap, String) {
    trace!(twiml = %twiml, "twiml response");
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/xml".parse().unwrap());
    (StatusCode::OK, headers, twiml)
}
