//! Trigger adapters: decode an inbound message, run the engine, and tell the
//! transport whether to stop redelivering.
//!
//! Decoding never touches the store. A payload that cannot be decoded is
//! rejected as permanent, because redelivering the same bytes cannot help.

pub mod pull;
pub mod push;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{error, warn};

use crate::engine::{ClaimEngine, RunOutcome};
use crate::error::{Error, Result};
use crate::model::{ItemId, Trigger};

/// Longest id accepted from a trigger, in bytes.
const MAX_ID_LEN: usize = 1500;

/// Field names a structured payload may use for the target id.
const ID_FIELDS: [&str; 3] = ["id", "itemId", "documentId"];

/// What the transport should do with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done, stop redelivery.
    Ack,
    /// Transient failure, redeliver.
    Nack,
    /// Permanently unusable, stop redelivery. Already logged.
    Reject,
}

impl Disposition {
    pub fn from_result(result: &Result<RunOutcome>) -> Self {
        match result {
            Ok(_) => Disposition::Ack,
            Err(e) if e.is_retryable() => Disposition::Nack,
            Err(_) => Disposition::Reject,
        }
    }
}

/// Run the engine for an already-decoded trigger and map the result.
pub async fn dispatch(engine: &ClaimEngine, decoded: Result<Trigger>) -> Disposition {
    let trigger = match decoded {
        Ok(trigger) => trigger,
        Err(e) => {
            error!(error = %e, "rejecting malformed trigger");
            return Disposition::Reject;
        }
    };
    let result = engine.run(&trigger).await;
    let disposition = Disposition::from_result(&result);
    match (&result, disposition) {
        (Err(e), Disposition::Nack) => warn!(error = %e, "trigger failed, requesting redelivery"),
        (Err(e), Disposition::Reject) => error!(error = %e, "trigger failed permanently"),
        _ => {}
    }
    disposition
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Push envelope as delivered by a Pub/Sub-style push subscription.
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: Option<PushMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: Option<String>,
    message_id: Option<String>,
}

/// Decode the body of a push request.
pub fn decode_push(body: &[u8]) -> Result<Trigger> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("envelope is not valid JSON: {e}")))?;
    let message = envelope
        .message
        .ok_or_else(|| Error::Decode("envelope has no message".to_string()))?;
    let data = message
        .data
        .ok_or_else(|| Error::Decode("message has no data".to_string()))?;

    let mut trigger = decode_data(&decode_base64(&data)?)?;
    trigger.message_id = message.message_id;
    Ok(trigger)
}

/// Decode a message body read from the trigger queue.
///
/// Accepts `null` (wake-up), a bare id string, an object carrying base64
/// `data`, or an object carrying an id field.
pub fn decode_queue_message(message: &serde_json::Value) -> Result<Trigger> {
    match message {
        serde_json::Value::Null => Ok(Trigger::wake()),
        serde_json::Value::String(text) => decode_data(text),
        serde_json::Value::Object(fields) => match fields.get("data") {
            Some(serde_json::Value::String(data)) => decode_data(&decode_base64(data)?),
            Some(_) => Err(Error::Decode("data must be a base64 string".to_string())),
            None => target_from_object(fields),
        },
        other => Err(Error::Decode(format!(
            "unsupported trigger payload: {other}"
        ))),
    }
}

/// Interpret decoded message text.
///
/// Empty text is a plain wake-up. JSON objects and strings are unwrapped;
/// anything else is taken as the id itself.
pub fn decode_data(text: &str) -> Result<Trigger> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Trigger::wake());
    }
    if text.starts_with('{') || text.starts_with('"') {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::Decode(format!("data looks like JSON but is not: {e}")))?;
        return match value {
            serde_json::Value::Object(fields) => target_from_object(&fields),
            serde_json::Value::String(id) => target(&id),
            other => Err(Error::Decode(format!("unsupported data: {other}"))),
        };
    }
    target(text)
}

fn decode_base64(data: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Decode(format!("data is not valid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(format!("data is not UTF-8: {e}")))
}

fn target_from_object(fields: &serde_json::Map<String, serde_json::Value>) -> Result<Trigger> {
    for name in ID_FIELDS {
        match fields.get(name) {
            Some(serde_json::Value::String(id)) => return target(id),
            Some(serde_json::Value::Null) | None => continue,
            Some(_) => return Err(Error::Decode(format!("{name} must be a string"))),
        }
    }
    Ok(Trigger::wake())
}

fn target(id: &str) -> Result<Trigger> {
    let id = id.trim();
    if id.is_empty() {
        return Ok(Trigger::wake());
    }
    if id.len() > MAX_ID_LEN {
        return Err(Error::Decode(format!(
            "id is {} bytes, limit is {MAX_ID_LEN}",
            id.len()
        )));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(Error::Decode("id contains control characters".to_string()));
    }
    Ok(Trigger::for_item(ItemId::from(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn push_body(data: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "message": {"data": STANDARD.encode(data), "messageId": "m-1"},
            "subscription": "projects/p/subscriptions/s"
        }))
        .unwrap()
    }

    #[test]
    fn push_envelope_with_plain_id() {
        let trigger = decode_push(&push_body("A1\n")).unwrap();
        assert_eq!(trigger.target, Some(ItemId::from("A1")));
        assert_eq!(trigger.message_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn push_envelope_with_structured_payload() {
        let trigger = decode_push(&push_body(r#"{"itemId": "A2", "source": "ingest"}"#)).unwrap();
        assert_eq!(trigger.target, Some(ItemId::from("A2")));

        let wake = decode_push(&push_body(r#"{"event": "new-article"}"#)).unwrap();
        assert_eq!(wake.target, None);
    }

    #[test]
    fn empty_data_is_a_wake_up() {
        assert_eq!(decode_push(&push_body("  ")).unwrap().target, None);
    }

    #[test]
    fn malformed_envelopes_are_decode_errors() {
        let cases: Vec<Vec<u8>> = vec![
            b"not json".to_vec(),
            serde_json::to_vec(&json!({"subscription": "s"})).unwrap(),
            serde_json::to_vec(&json!({"message": {"messageId": "m"}})).unwrap(),
            serde_json::to_vec(&json!({"message": {"data": "%%%not-base64"}})).unwrap(),
            serde_json::to_vec(&json!({"message": {"data": STANDARD.encode([0xff, 0xfe])}}))
                .unwrap(),
            push_body("{broken json"),
            push_body("bad\u{7}id"),
        ];
        for body in cases {
            let err = decode_push(&body).unwrap_err();
            assert!(matches!(err, Error::Decode(_)), "got {err:?}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn oversized_id_is_rejected() {
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert!(matches!(decode_data(&long), Err(Error::Decode(_))));
    }

    #[test]
    fn queue_messages_in_every_shape() {
        assert_eq!(decode_queue_message(&json!(null)).unwrap().target, None);
        assert_eq!(
            decode_queue_message(&json!("A1")).unwrap().target,
            Some(ItemId::from("A1"))
        );
        assert_eq!(
            decode_queue_message(&json!({"data": STANDARD.encode("A2")}))
                .unwrap()
                .target,
            Some(ItemId::from("A2"))
        );
        assert_eq!(
            decode_queue_message(&json!({"documentId": "A3"}))
                .unwrap()
                .target,
            Some(ItemId::from("A3"))
        );
        assert!(decode_queue_message(&json!(42)).is_err());
        assert!(decode_queue_message(&json!({"id": 7})).is_err());
    }
}
