/*!
Result payloads returned by the backend for successful calls.

The backends are not consistent about the key carrying SDP
(`value`, `sdp`, `sdpAnswer` or `sdpOffer`), [`SdpReply`] accepts any of them.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::ClientType;

/// Primitive results are wrapped by the RPC layer as `{ "value": ... }`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValueReply {
    #[serde(default)]
    pub value: Option<String>,
}

impl ValueReply {
    /// Registration result string used by the one-to-one backend.
    pub const ACCEPTED: &'static str = "accepted";

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.value.as_deref() == Some(Self::ACCEPTED)
    }
}

/// SFU registration result.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegisterReply {
    #[serde(rename = "type")]
    pub client_type: ClientType,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SdpReply {
    #[serde(alias = "value", alias = "sdpAnswer", alias = "sdpOffer")]
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallResponse {
    Accepted,
    Rejected,
    Failed,
}

/// Outcome of a `call`, also the shape of the reply to `incomingCall`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallReply {
    pub response: CallResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallReply {
    #[must_use]
    pub fn accepted(message: &str) -> Self {
        Self {
            response: CallResponse::Accepted,
            message: Some(message.to_owned()),
        }
    }

    #[must_use]
    pub fn rejected(message: &str) -> Self {
        Self {
            response: CallResponse::Rejected,
            message: Some(message.to_owned()),
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.response == CallResponse::Accepted
    }
}

/// Decode a typed result out of a raw RPC result.
///
/// A bare JSON string is treated as `{ "value": <string> }`.
///
/// # Errors
/// Fails when the payload does not have the expected shape.
pub fn decode<T: serde::de::DeserializeOwned>(result: Value) -> serde_json::Result<T> {
    match result {
        Value::String(value) => serde_json::from_value(serde_json::json!({ "value": value })),
        other => serde_json::from_value(other),
    }
}
