/*!
Messages pushed by the backend without a preceding request.

JSON-RPC backends deliver them as named notifications (or, for `incomingCall`,
as a request expecting a reply). The STOMP backend delivers them on
user-scoped destinations, see [`crate::stomp`].
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{IceCandidate, UserId};
use crate::stomp;
use crate::ProtocolError;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// Remote ICE candidate, keyed by the local media session it belongs to
    /// on pages that own more than one peer.
    IceCandidate {
        candidate: IceCandidate,
        user_id: Option<UserId>,
    },
    /// Another user is ringing. Must be answered with a
    /// [`crate::response::CallReply`].
    IncomingCall { caller: String },
    /// Backend driven renegotiation carrying a fresh SDP offer.
    ViewerNegotiation { sdp_offer: String },
    /// STOMP loopback: the backend's SDP offer, sent in reply to `/app/start`.
    StartOffer { sdp: String },
    /// STOMP loopback: error reported by the backend.
    ServerError { message: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CandidatePayload {
    Keyed {
        candidate: IceCandidate,
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    Plain(IceCandidate),
}

#[derive(Deserialize)]
struct IncomingCallPayload {
    caller: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OfferPayload {
    Bare(String),
    Wrapped {
        #[serde(alias = "value", alias = "sdpOffer")]
        sdp: String,
    },
}

impl OfferPayload {
    fn into_sdp(self) -> String {
        match self {
            Self::Bare(sdp) | Self::Wrapped { sdp } => sdp,
        }
    }
}

impl From<CandidatePayload> for Notification {
    fn from(payload: CandidatePayload) -> Self {
        match payload {
            CandidatePayload::Keyed { candidate, user_id } => Self::IceCandidate {
                candidate,
                user_id: Some(user_id),
            },
            CandidatePayload::Plain(candidate) => Self::IceCandidate {
                candidate,
                user_id: None,
            },
        }
    }
}

impl Notification {
    /// Decode a named JSON-RPC notification.
    ///
    /// # Errors
    /// Fails on an unknown method or a payload of the wrong shape.
    pub fn from_rpc(method: &str, params: Value) -> Result<Self, ProtocolError> {
        match method {
            "iceCandidate" => Ok(serde_json::from_value::<CandidatePayload>(params)?.into()),
            "incomingCall" => {
                let payload: IncomingCallPayload = serde_json::from_value(params)?;
                Ok(Self::IncomingCall {
                    caller: payload.caller,
                })
            }
            "viewerNegotiation" => Ok(Self::ViewerNegotiation {
                sdp_offer: serde_json::from_value::<OfferPayload>(params)?.into_sdp(),
            }),
            other => Err(ProtocolError::UnknownMethod(other.to_owned())),
        }
    }

    /// Decode a STOMP message body received on one of the subscribed destinations.
    ///
    /// # Errors
    /// Fails on an unknown destination or a body of the wrong shape.
    pub fn from_stomp(destination: &str, body: &str) -> Result<Self, ProtocolError> {
        match destination {
            stomp::START_TOPIC => Ok(Self::StartOffer {
                sdp: serde_json::from_str::<OfferPayload>(body)?.into_sdp(),
            }),
            stomp::ICE_CANDIDATES_QUEUE => {
                Ok(serde_json::from_str::<CandidatePayload>(body)?.into())
            }
            stomp::ERRORS_TOPIC => Ok(Self::ServerError {
                message: body.to_owned(),
            }),
            other => Err(ProtocolError::UnknownDestination(other.to_owned())),
        }
    }
}
