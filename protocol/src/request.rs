/*!
Outbound calls a page makes towards the signaling backend.

Each [`Request`] variant is one JSON-RPC method; its payload is the literal
parameter object sent alongside the method name. Optional fields are omitted
from the wire when absent.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{IceCandidate, MediaProfile, UserId};
use crate::response::CallReply;

/// Parameter object for methods that take none, serialized as `{}`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulcast: Option<bool>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    pub to: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAnswerParams {
    pub sdp_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateParams {
    pub candidate: IceCandidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingParams {
    pub path: String,
    pub media_profile: MediaProfile,
}

/// Every outbound call known to the tutorial backends.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    /// Loopback: open a client session, no parameters.
    RegisterClient(Empty),
    /// One-to-one (`name`) and SFU (`simulcast`) registration.
    Register(RegisterParams),
    /// Loopback: ask the backend for its SDP offer.
    StartMediaSession(Empty),
    /// Offer/answer exchange, direction depends on the page and role.
    NegotiateWebRtc(NegotiateParams),
    /// One-to-one: ring another registered user.
    Call(CallParams),
    ProcessAnswer(ProcessAnswerParams),
    IceCandidate(IceCandidateParams),
    Stop(Empty),
    StopMediaSession(Empty),
    StopUserSession(UserParams),
    SwitchQuality(UserParams),
    StartRecording(RecordingParams),
    StopRecording(Empty),
}

impl Request {
    /// JSON-RPC method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match *self {
            Self::RegisterClient(_) => "registerClient",
            Self::Register(_) => "register",
            Self::StartMediaSession(_) => "startMediaSession",
            Self::NegotiateWebRtc(_) => "negotiateWebRtc",
            Self::Call(_) => "call",
            Self::ProcessAnswer(_) => "processAnswer",
            Self::IceCandidate(_) => "iceCandidate",
            Self::Stop(_) => "stop",
            Self::StopMediaSession(_) => "stopMediaSession",
            Self::StopUserSession(_) => "stopUserSession",
            Self::SwitchQuality(_) => "switchQuality",
            Self::StartRecording(_) => "startRecording",
            Self::StopRecording(_) => "stopRecording",
        }
    }

    /// Literal parameter object, always a JSON object.
    ///
    /// # Errors
    /// Fails only if a payload cannot be represented as JSON.
    pub fn params(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("params")
            .map_or_else(|| Value::Object(serde_json::Map::new()), Value::take))
    }

    /// Media session of the SFU pages this call is about, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match *self {
            Self::NegotiateWebRtc(NegotiateParams { ref user_id, .. })
            | Self::ProcessAnswer(ProcessAnswerParams { ref user_id, .. })
            | Self::IceCandidate(IceCandidateParams { ref user_id, .. }) => user_id.as_ref(),
            Self::StopUserSession(UserParams { ref user_id })
            | Self::SwitchQuality(UserParams { ref user_id }) => Some(user_id),
            _ => None,
        }
    }

    /// Whether this call ends a media session on the backend.
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(
            *self,
            Self::Stop(_) | Self::StopMediaSession(_) | Self::StopUserSession(_)
        )
    }
}

/// Reply a page sends back to an `incomingCall` request.
pub type IncomingCallReply = CallReply;

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn method_names_match_backend_handlers() {
        assert_eq!(Request::RegisterClient(Empty {}).method(), "registerClient");
        assert_eq!(
            Request::NegotiateWebRtc(NegotiateParams::default()).method(),
            "negotiateWebRtc"
        );
        assert_eq!(
            Request::StopUserSession(UserParams {
                user_id: UserId::from("viewer0")
            })
            .method(),
            "stopUserSession"
        );
    }

    #[test]
    fn params_omit_absent_fields() {
        let request = Request::NegotiateWebRtc(NegotiateParams {
            user_id: Some(UserId::from("presenter")),
            sdp_offer: None,
        });
        assert_eq!(request.params().unwrap(), json!({ "userId": "presenter" }));

        let request = Request::Register(RegisterParams {
            name: Some("alice".to_owned()),
            simulcast: None,
        });
        assert_eq!(request.params().unwrap(), json!({ "name": "alice" }));
    }

    #[test]
    fn parameterless_methods_send_empty_object() {
        assert_eq!(Request::Stop(Empty {}).params().unwrap(), json!({}));
        assert_eq!(
            Request::StartMediaSession(Empty {}).params().unwrap(),
            json!({})
        );
    }

    #[test]
    fn recording_params_carry_profile() {
        let request = Request::StartRecording(RecordingParams {
            path: "file:///tmp/demo.mp4".to_owned(),
            media_profile: MediaProfile::Mp4,
        });
        assert_eq!(
            request.params().unwrap(),
            json!({ "path": "file:///tmp/demo.mp4", "mediaProfile": "MP4" })
        );
    }

    #[test]
    fn user_id_names_the_media_session() {
        let viewer = UserId::from("viewer1");
        assert_eq!(
            Request::SwitchQuality(UserParams {
                user_id: viewer.clone()
            })
            .user_id(),
            Some(&viewer)
        );
        assert_eq!(
            Request::NegotiateWebRtc(NegotiateParams::default()).user_id(),
            None
        );
        assert_eq!(Request::Stop(Empty {}).user_id(), None);
    }

    #[test]
    fn stop_class_methods_are_recognised() {
        assert!(Request::Stop(Empty {}).is_stop());
        assert!(Request::StopMediaSession(Empty {}).is_stop());
        assert!(!Request::StopRecording(Empty {}).is_stop());
    }
}
