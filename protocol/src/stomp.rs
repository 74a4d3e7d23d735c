/*!
Destinations used by the STOMP flavour of the loopback demo.

Outbound messages go to application destinations (`/app/...`), inbound ones
arrive on user-scoped subscriptions (`/user/...`). Bodies are JSON.
 */

use crate::request::Request;

/// Endpoint the SockJS socket is opened against.
pub const ENDPOINT: &str = "/loopback";

pub const START: &str = "/app/start";
pub const PROCESS_ANSWER: &str = "/app/processAnswer";
pub const ICE_CANDIDATE: &str = "/app/ice-candidate";
pub const STOP: &str = "/app/stop";

pub const ERRORS_TOPIC: &str = "/user/topic/errors";
pub const ICE_CANDIDATES_QUEUE: &str = "/user/queue/ice-candidates";
pub const START_TOPIC: &str = "/user/topic/start";

/// Every destination a page has to subscribe to after connecting.
pub const SUBSCRIPTIONS: [&str; 3] = [ERRORS_TOPIC, ICE_CANDIDATES_QUEUE, START_TOPIC];

/// Map a request onto its STOMP destination and body.
///
/// Returns `None` for calls the STOMP backend does not expose.
/// An empty body means the frame is sent without one.
///
/// # Errors
/// Fails only if the payload cannot be represented as JSON.
pub fn frame_for(request: &Request) -> serde_json::Result<Option<(&'static str, String)>> {
    let frame = match *request {
        Request::StartMediaSession(_) => Some((START, String::new())),
        Request::ProcessAnswer(ref params) => Some((
            PROCESS_ANSWER,
            serde_json::to_string(&serde_json::json!({ "sdpAnswer": params.sdp_answer }))?,
        )),
        Request::IceCandidate(ref params) => {
            Some((ICE_CANDIDATE, serde_json::to_string(&params.candidate)?))
        }
        Request::StopMediaSession(_) | Request::Stop(_) => Some((STOP, String::new())),
        _ => None,
    };
    Ok(frame)
}
