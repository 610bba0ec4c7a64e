use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::message::{DDP_SUPPORTED_VERSIONS, DDP_VERSION};

/// Correlation id for method calls and subscriptions.
pub type RequestId = u64;

/// A client-to-server frame.
///
/// Serializes as one JSON object whose `msg` member names the kind. Request
/// ids go on the wire as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum OutgoingFrame {
    Connect {
        version: String,
        support: Vec<String>,
    },
    Method {
        method: String,
        params: Vec<Value>,
        #[serde(serialize_with = "id_as_string")]
        id: RequestId,
    },
    #[serde(rename = "sub")]
    Subscribe {
        name: String,
        params: Vec<Value>,
        #[serde(serialize_with = "id_as_string")]
        id: RequestId,
    },
}

impl OutgoingFrame {
    /// The handshake sent right after the socket opens.
    pub fn connect() -> Self {
        Self::Connect {
            version: DDP_VERSION.to_string(),
            support: DDP_SUPPORTED_VERSIONS
                .iter()
                .map(|v| (*v).to_string())
                .collect(),
        }
    }

    /// A method invocation. `params` keep their order and JSON types.
    pub fn method(method: impl Into<String>, params: Vec<Value>, id: RequestId) -> Self {
        Self::Method {
            method: method.into(),
            params,
            id,
        }
    }

    /// A subscription request.
    pub fn subscribe(name: impl Into<String>, params: Vec<Value>, id: RequestId) -> Self {
        Self::Subscribe {
            name: name.into(),
            params,
            id,
        }
    }

    /// Request id carried by this frame, if any.
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Connect { .. } => None,
            Self::Method { id, .. } | Self::Subscribe { id, .. } => Some(*id),
        }
    }

    /// Encode as a single-line JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn id_as_string<S>(id: &RequestId, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(id)
}
