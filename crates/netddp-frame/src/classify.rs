//! Inbound frame classification.
//!
//! Rules, first match wins:
//! 1. `error` member present, or `msg == "error"`: protocol error
//! 2. `session` member present: connected
//! 3. `msg` member present: `added` / `changed` / `removed` / `nosub` / `ready`
//! 4. `result` member present: method result
//! 5. anything else is dropped
//!
//! Unknown `msg` kinds fall through to rule 4. Frames with missing or
//! mistyped envelope members classify to `None` instead of failing.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::event::{FieldValue, IncomingEvent, Record};
use crate::message::{
    MSG_ADDED, MSG_CHANGED, MSG_ERROR, MSG_NOSUB, MSG_READY, MSG_REMOVED, PROP_COLLECTION,
    PROP_DETAIL_MESSAGE, PROP_ERROR, PROP_FIELDS, PROP_ID, PROP_MESSAGE, PROP_REASON,
    PROP_RESULT, PROP_SESSION, PROP_SUBS, RECORD_COLLECTION, RECORD_ID,
};

/// Parse one raw text frame and classify it.
///
/// Returns an error only when the text is not a JSON object.
pub fn classify(raw: &str) -> Result<Option<IncomingEvent>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(envelope) => Ok(classify_value(&envelope)),
        other => Err(FrameError::NotAnObject(json_kind(&other))),
    }
}

/// Classify an already parsed envelope. Never fails.
pub fn classify_value(envelope: &Map<String, Value>) -> Option<IncomingEvent> {
    let msg = envelope.get(PROP_MESSAGE).map(value_text);

    if let Some(error) = envelope.get(PROP_ERROR) {
        return Some(protocol_error(error));
    }
    if msg.as_deref() == Some(MSG_ERROR) {
        return Some(protocol_error(&Value::Object(envelope.clone())));
    }

    if let Some(session) = envelope.get(PROP_SESSION) {
        return Some(IncomingEvent::Connected {
            session: value_text(session),
        });
    }

    if let Some(msg) = msg.as_deref() {
        match msg {
            MSG_ADDED | MSG_CHANGED | MSG_REMOVED => return record_event(msg, envelope),
            MSG_NOSUB => return Some(nosub(envelope)),
            MSG_READY => return ready(envelope),
            other => trace!(msg = other, "unhandled message kind"),
        }
    }

    if let Some(result) = envelope.get(PROP_RESULT) {
        let requesting_id = envelope.get(PROP_ID).map(value_text)?;
        return Some(IncomingEvent::MethodResult {
            requesting_id,
            result: result.clone(),
        });
    }

    None
}

/// Capitalize the first character of a field name.
pub fn normalize_field_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn protocol_error(payload: &Value) -> IncomingEvent {
    match payload {
        Value::Object(detail) => IncomingEvent::ProtocolError {
            reason: detail.get(PROP_REASON).map(value_text).unwrap_or_default(),
            code: detail.get(PROP_ERROR).map(value_text),
            message: detail.get(PROP_DETAIL_MESSAGE).map(value_text),
        },
        other => IncomingEvent::ProtocolError {
            reason: value_text(other),
            code: None,
            message: None,
        },
    }
}

// `nosub` carrying an `error` member is handled by rule 1.
fn nosub(envelope: &Map<String, Value>) -> IncomingEvent {
    IncomingEvent::ProtocolError {
        reason: MSG_NOSUB.to_string(),
        code: None,
        message: envelope.get(PROP_ID).map(value_text),
    }
}

fn ready(envelope: &Map<String, Value>) -> Option<IncomingEvent> {
    let subs = envelope.get(PROP_SUBS)?.as_array()?;
    // Ids go out as strings, so servers usually echo them back as strings.
    let subscription_ids = subs
        .iter()
        .map(|id| match id {
            Value::String(text) => text.parse().ok(),
            other => other.as_u64(),
        })
        .collect::<Option<Vec<_>>>()?;
    Some(IncomingEvent::Ready { subscription_ids })
}

fn record_event(kind: &str, envelope: &Map<String, Value>) -> Option<IncomingEvent> {
    let id = envelope.get(PROP_ID).map(value_text)?;
    let collection = envelope.get(PROP_COLLECTION).map(value_text)?;

    let mut fields = match envelope.get(PROP_FIELDS) {
        Some(Value::Object(fields)) => map_record(fields),
        _ => Record::new(),
    };
    fields.insert(RECORD_ID.to_string(), FieldValue::Text(id.clone()));
    fields.insert(
        RECORD_COLLECTION.to_string(),
        FieldValue::Text(collection.clone()),
    );

    let event = match kind {
        MSG_ADDED => IncomingEvent::Added {
            collection,
            id,
            fields,
        },
        MSG_CHANGED => IncomingEvent::Changed {
            collection,
            id,
            fields,
        },
        _ => IncomingEvent::Removed {
            collection,
            id,
            fields,
        },
    };
    Some(event)
}

fn map_record(object: &Map<String, Value>) -> Record {
    let mut record = Record::new();
    for (key, value) in object {
        let mapped = match value {
            Value::Object(nested) => FieldValue::Record(map_record(nested)),
            Value::Array(items) => match items.first() {
                None => continue,
                Some(Value::Object(_)) => {
                    let records: Vec<Record> = items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(map_record)
                        .collect();
                    // The first element decides the list kind; other shapes are skipped.
                    if records.len() < items.len() {
                        trace!(
                            field = %key,
                            dropped = items.len() - records.len(),
                            "non-object elements skipped in record list"
                        );
                    }
                    FieldValue::RecordList(records)
                }
                Some(_) => FieldValue::TextList(items.iter().map(value_text).collect()),
            },
            scalar => FieldValue::Text(value_text(scalar)),
        };
        record.insert(normalize_field_name(key), mapped);
    }
    record
}

/// Textual form of a JSON value: strings unquoted, null empty, rest as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classify_json(value: Value) -> Option<IncomingEvent> {
        classify(&value.to_string()).expect("object frames never fail")
    }

    #[test]
    fn session_frame_is_connected() {
        let event = classify(r#"{"server_id":"0","session":"abc123"}"#).unwrap();
        assert_eq!(
            event,
            Some(IncomingEvent::Connected {
                session: "abc123".to_string()
            })
        );
    }

    #[test]
    fn ready_keeps_subscription_order() {
        let event = classify(r#"{"msg":"ready","subs":[3,5]}"#).unwrap();
        assert_eq!(
            event,
            Some(IncomingEvent::Ready {
                subscription_ids: vec![3, 5]
            })
        );
    }

    #[test]
    fn ready_accepts_string_ids() {
        assert_eq!(
            classify_json(json!({"msg": "ready", "subs": ["1", "12"]})),
            Some(IncomingEvent::Ready {
                subscription_ids: vec![1, 12]
            })
        );
    }

    #[test]
    fn ready_with_non_integer_subs_is_dropped() {
        assert_eq!(classify_json(json!({"msg": "ready", "subs": ["x"]})), None);
        assert_eq!(classify_json(json!({"msg": "ready"})), None);
    }

    #[test]
    fn added_maps_fields_and_envelope() {
        let event = classify(
            r#"{"msg":"added","collection":"pkgs","id":"42","fields":{"firstName":"x"}}"#,
        )
        .unwrap()
        .expect("added frame should classify");

        match &event {
            IncomingEvent::Added {
                collection,
                id,
                fields,
            } => {
                assert_eq!(collection, "pkgs");
                assert_eq!(id, "42");
                assert_eq!(fields["FirstName"].as_text(), Some("x"));
                assert_eq!(fields["Id"].as_text(), Some("42"));
                assert_eq!(fields["Collection"].as_text(), Some("pkgs"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.kind(), "added");
    }

    #[test]
    fn changed_and_removed_use_same_mapping() {
        let changed = classify_json(json!({
            "msg": "changed", "collection": "c", "id": "1", "fields": {"name": "n"}
        }))
        .unwrap();
        assert!(matches!(changed, IncomingEvent::Changed { .. }));
        assert_eq!(changed.record().unwrap()["Name"].as_text(), Some("n"));

        let removed = classify_json(json!({"msg": "removed", "collection": "c", "id": "1"}))
            .unwrap();
        assert!(matches!(removed, IncomingEvent::Removed { .. }));
        let record = removed.record().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record["Id"].as_text(), Some("1"));
    }

    #[test]
    fn nested_fields_map_recursively() {
        let event = classify_json(json!({
            "msg": "added",
            "collection": "packages",
            "id": "p1",
            "fields": {
                "name": "iron-router",
                "latestVersion": {"version": "1.0.0", "downloads": 12},
                "tags": ["routing", 3, true],
                "maintainers": [{"username": "a"}, {"username": "b"}],
                "empty": [],
                "license": null
            }
        }))
        .unwrap();
        let record = event.record().unwrap();

        let latest = record["LatestVersion"].as_record().unwrap();
        assert_eq!(latest["Version"].as_text(), Some("1.0.0"));
        assert_eq!(latest["Downloads"].as_text(), Some("12"));

        assert_eq!(
            record["Tags"].as_text_list().unwrap(),
            ["routing", "3", "true"]
        );

        let maintainers = record["Maintainers"].as_record_list().unwrap();
        assert_eq!(maintainers.len(), 2);
        assert_eq!(maintainers[1]["Username"].as_text(), Some("b"));

        assert!(!record.contains_key("Empty"));
        assert_eq!(record["License"].as_text(), Some(""));
    }

    #[test]
    fn record_fields_keep_server_order() {
        let event = classify(
            r#"{"msg":"added","collection":"c","id":"1","fields":{"zeta":"z","alpha":"a","mid":{"b":"1","a":"2"}}}"#,
        )
        .unwrap()
        .unwrap();
        let record = event.record().unwrap();

        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Zeta", "Alpha", "Mid", "Id", "Collection"]);
        let nested: Vec<&str> = record["Mid"]
            .as_record()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(nested, ["B", "A"]);
    }

    #[test]
    fn record_list_skips_non_object_elements() {
        let event = classify(
            r#"{"msg":"added","collection":"c","id":"1","fields":{"items":[{"a":1},"x",{"b":2},[3]]}}"#,
        )
        .unwrap()
        .unwrap();

        let items = event.record().unwrap()["Items"].as_record_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["A"].as_text(), Some("1"));
        assert_eq!(items[1]["B"].as_text(), Some("2"));
    }

    #[test]
    fn record_event_without_id_is_dropped() {
        assert_eq!(
            classify_json(json!({"msg": "added", "collection": "c", "fields": {}})),
            None
        );
    }

    #[test]
    fn error_member_wins_over_everything() {
        let event = classify_json(json!({
            "session": "s",
            "msg": "added",
            "error": {"error": 404, "reason": "Method not found", "message": "Method not found [404]"}
        }));
        assert_eq!(
            event,
            Some(IncomingEvent::ProtocolError {
                reason: "Method not found".to_string(),
                code: Some("404".to_string()),
                message: Some("Method not found [404]".to_string()),
            })
        );
    }

    #[test]
    fn error_message_kind_reads_envelope() {
        let event = classify_json(json!({"msg": "error", "reason": "bad frame"}));
        assert_eq!(
            event,
            Some(IncomingEvent::ProtocolError {
                reason: "bad frame".to_string(),
                code: None,
                message: None,
            })
        );
    }

    #[test]
    fn nosub_with_error_reports_embedded_error() {
        let event = classify_json(json!({
            "msg": "nosub",
            "id": "2",
            "error": {"error": "sub-not-found", "reason": "Subscription not found"}
        }));
        assert_eq!(
            event,
            Some(IncomingEvent::ProtocolError {
                reason: "Subscription not found".to_string(),
                code: Some("sub-not-found".to_string()),
                message: None,
            })
        );
    }

    #[test]
    fn nosub_without_error_is_protocol_error() {
        let event = classify_json(json!({"msg": "nosub", "id": "9"}));
        assert_eq!(
            event,
            Some(IncomingEvent::ProtocolError {
                reason: "nosub".to_string(),
                code: None,
                message: Some("9".to_string()),
            })
        );
    }

    #[test]
    fn result_frame_is_method_result() {
        let event = classify(r#"{"id":"4","result":{"ok":true}}"#).unwrap();
        assert_eq!(
            event,
            Some(IncomingEvent::MethodResult {
                requesting_id: "4".to_string(),
                result: json!({"ok": true}),
            })
        );
    }

    #[test]
    fn unknown_msg_kind_falls_through_to_result() {
        let event = classify_json(json!({"msg": "result", "id": "1", "result": 5}));
        assert_eq!(
            event,
            Some(IncomingEvent::MethodResult {
                requesting_id: "1".to_string(),
                result: json!(5),
            })
        );
    }

    #[test]
    fn unrecognized_frames_are_dropped() {
        assert_eq!(classify_json(json!({"msg": "ping"})), None);
        assert_eq!(classify_json(json!({"server_id": "0"})), None);
        assert_eq!(classify_json(json!({})), None);
    }

    #[test]
    fn non_object_text_is_an_error() {
        assert!(matches!(
            classify("[1,2]"),
            Err(FrameError::NotAnObject("array"))
        ));
        assert!(matches!(classify("{not json"), Err(FrameError::Json(_))));
    }

    #[test]
    fn normalize_capitalizes_first_character_only() {
        assert_eq!(normalize_field_name("firstName"), "FirstName");
        assert_eq!(normalize_field_name("Already"), "Already");
        assert_eq!(normalize_field_name("élan"), "Élan");
        assert_eq!(normalize_field_name(""), "");
        assert_eq!(normalize_field_name("_id"), "_id");
    }
}
