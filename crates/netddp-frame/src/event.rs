use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::outgoing::RequestId;

/// Field name → value mapping of a pushed record, in the order the server sent
/// the fields, followed by `Id` and `Collection`.
pub type Record = IndexMap<String, FieldValue>;

/// One field of a pushed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A scalar, in its textual form.
    Text(String),
    /// A nested object.
    Record(Record),
    /// An array of scalars, each in its textual form.
    TextList(Vec<String>),
    /// An array of nested objects.
    RecordList(Vec<Record>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::TextList(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record_list(&self) -> Option<&[Record]> {
        match self {
            FieldValue::RecordList(items) => Some(items),
            _ => None,
        }
    }
}

/// A classified server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingEvent {
    /// Handshake accepted; carries the server session id.
    Connected { session: String },
    /// A record joined a subscription's result set.
    Added {
        collection: String,
        id: String,
        fields: Record,
    },
    /// A record in a result set changed.
    Changed {
        collection: String,
        id: String,
        fields: Record,
    },
    /// A record left a result set.
    Removed {
        collection: String,
        id: String,
        fields: Record,
    },
    /// The listed subscriptions have sent their initial data.
    Ready { subscription_ids: Vec<RequestId> },
    /// Result of an earlier method call.
    MethodResult { requesting_id: String, result: Value },
    /// The server reported an error.
    ProtocolError {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl IncomingEvent {
    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingEvent::Connected { .. } => "connected",
            IncomingEvent::Added { .. } => "added",
            IncomingEvent::Changed { .. } => "changed",
            IncomingEvent::Removed { .. } => "removed",
            IncomingEvent::Ready { .. } => "ready",
            IncomingEvent::MethodResult { .. } => "method_result",
            IncomingEvent::ProtocolError { .. } => "protocol_error",
        }
    }

    /// Mapped record for added/changed/removed events.
    pub fn record(&self) -> Option<&Record> {
        match self {
            IncomingEvent::Added { fields, .. }
            | IncomingEvent::Changed { fields, .. }
            | IncomingEvent::Removed { fields, .. } => Some(fields),
            _ => None,
        }
    }
}
