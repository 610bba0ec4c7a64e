//! Message kinds and envelope property names.

/// Protocol version announced in the handshake.
pub const DDP_VERSION: &str = "pre1";
/// Versions offered in the handshake `support` list.
pub const DDP_SUPPORTED_VERSIONS: &[&str] = &[DDP_VERSION];

pub const MSG_READY: &str = "ready";
pub const MSG_ADDED: &str = "added";
pub const MSG_CHANGED: &str = "changed";
pub const MSG_REMOVED: &str = "removed";
pub const MSG_NOSUB: &str = "nosub";
pub const MSG_ERROR: &str = "error";

pub const PROP_MESSAGE: &str = "msg";
pub const PROP_ID: &str = "id";
pub const PROP_COLLECTION: &str = "collection";
pub const PROP_FIELDS: &str = "fields";
pub const PROP_SESSION: &str = "session";
pub const PROP_RESULT: &str = "result";
pub const PROP_ERROR: &str = "error";
pub const PROP_SUBS: &str = "subs";
pub const PROP_REASON: &str = "reason";
pub const PROP_DETAIL_MESSAGE: &str = "message";

/// Record key that carries the envelope `id`.
pub const RECORD_ID: &str = "Id";
/// Record key that carries the envelope `collection`.
pub const RECORD_COLLECTION: &str = "Collection";
