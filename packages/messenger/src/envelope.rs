//! The message envelope exchanged over the transport.
//!
//! Every payload is a single JSON document:
//!
//! ```json
//! {"id": "client_0", "type": "invoke", "body": {"name": "math.add", "args": [2, 3]}}
//! {"id": "client_0", "type": "succeeded", "body": 5}
//! {"id": "client_0", "type": "failed", "body": {"name": "exception", "message": "boom", "detail": "boom"}}
//! {"id": "ready", "type": "control", "body": {}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fault::ErrorBody;

/// Id of the control envelope announcing liveness.
pub const READY_ID: &str = "ready";

/// Classification of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Invoke,
    Succeeded,
    Failed,
    Control,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Invoke => "invoke",
            EnvelopeKind::Succeeded => "succeeded",
            EnvelopeKind::Failed => "failed",
            EnvelopeKind::Control => "control",
        }
    }

    /// `succeeded` or `failed`.
    pub fn is_reply(&self) -> bool {
        matches!(self, EnvelopeKind::Succeeded | EnvelopeKind::Failed)
    }
}

/// The top-level `{id, type, body}` unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EnvelopeKind,

    #[serde(default)]
    pub body: Value,
}

/// Body of an `invoke` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeBody {
    pub name: String,

    #[serde(default)]
    pub args: Vec<Value>,
}

impl Envelope {
    pub fn invoke(id: impl Into<String>, name: impl Into<String>, args: Vec<Value>) -> Self {
        let name: String = name.into();
        Self {
            id: id.into(),
            kind: EnvelopeKind::Invoke,
            body: serde_json::json!({ "name": name, "args": args }),
        }
    }

    pub fn succeeded(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Succeeded,
            body: result,
        }
    }

    pub fn failed(id: impl Into<String>, error: &ErrorBody) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Failed,
            body: error.to_value(),
        }
    }

    pub fn control(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Control,
            body,
        }
    }

    /// The liveness announcement sent when a messenger is created.
    pub fn ready() -> Self {
        Self::control(READY_ID, Value::Object(Map::new()))
    }

    /// Parse a transport payload.
    ///
    /// Fails if the text is not JSON or does not match the envelope schema
    /// (missing `id`, unknown `type`, non-object document).
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Interpret the body as an `invoke` body.
    pub fn invoke_body(&self) -> Result<InvokeBody, serde_json::Error> {
        InvokeBody::deserialize(&self.body)
    }
}
