use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netddp_frame::message::{RECORD_COLLECTION, RECORD_ID};
use netddp_frame::{FieldValue, IncomingEvent, Record};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    #[serde(flatten)]
    event: &'a IncomingEvent,
    timestamp: String,
}

pub fn print_event(event: &IncomingEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                event,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let (collection, id) = location(event);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "COLLECTION", "ID", "DETAIL"])
                .add_row(vec![
                    event.kind().to_string(),
                    collection.to_string(),
                    id.to_string(),
                    detail(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let (collection, id) = location(event);
            println!(
                "{} collection={} id={} {}",
                event.kind(),
                if collection.is_empty() { "-" } else { collection },
                if id.is_empty() { "-" } else { id },
                detail(event)
            );
        }
    }
}

fn location(event: &IncomingEvent) -> (&str, &str) {
    match event {
        IncomingEvent::Added { collection, id, .. }
        | IncomingEvent::Changed { collection, id, .. }
        | IncomingEvent::Removed { collection, id, .. } => (collection.as_str(), id.as_str()),
        IncomingEvent::MethodResult { requesting_id, .. } => ("", requesting_id.as_str()),
        _ => ("", ""),
    }
}

fn detail(event: &IncomingEvent) -> String {
    match event {
        IncomingEvent::Connected { session } => format!("session={session}"),
        IncomingEvent::Added { fields, .. }
        | IncomingEvent::Changed { fields, .. }
        | IncomingEvent::Removed { fields, .. } => record_summary(fields),
        IncomingEvent::Ready { subscription_ids } => {
            let ids: Vec<String> = subscription_ids.iter().map(u64::to_string).collect();
            format!("subs={}", ids.join(","))
        }
        IncomingEvent::MethodResult { result, .. } => format!("result={result}"),
        IncomingEvent::ProtocolError {
            reason,
            code,
            message,
        } => {
            let mut out = format!("reason={reason}");
            if let Some(code) = code {
                out.push_str(&format!(" code={code}"));
            }
            if let Some(message) = message {
                out.push_str(&format!(" message={message}"));
            }
            out
        }
    }
}

/// `Key=value` pairs for the record's own fields; envelope keys are shown elsewhere.
fn record_summary(fields: &Record) -> String {
    fields
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), RECORD_ID | RECORD_COLLECTION))
        .map(|(name, value)| format!("{name}={}", field_preview(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn field_preview(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Record(record) => format!("{{{}}}", record_summary(record)),
        FieldValue::TextList(items) => format!("[{}]", items.join(",")),
        FieldValue::RecordList(records) => format!("[{} records]", records.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_detail_skips_envelope_keys() {
        let event = netddp_frame::classify(
            r#"{"msg":"added","collection":"tasks","id":"t1","fields":{"title":"x","tags":["a","b"]}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(location(&event), ("tasks", "t1"));
        assert_eq!(detail(&event), "Title=x Tags=[a,b]");
    }

    #[test]
    fn protocol_error_detail_lists_optional_parts() {
        let event = IncomingEvent::ProtocolError {
            reason: "not found".to_string(),
            code: Some("404".to_string()),
            message: None,
        };
        assert_eq!(detail(&event), "reason=not found code=404");
    }

    #[test]
    fn json_output_flattens_event() {
        let event = IncomingEvent::MethodResult {
            requesting_id: "3".to_string(),
            result: json!({"ok": true}),
        };
        let out = EventOutput {
            event: &event,
            timestamp: "0".to_string(),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["type"], "method_result");
        assert_eq!(value["requesting_id"], "3");
        assert_eq!(value["result"]["ok"], true);
    }
}
