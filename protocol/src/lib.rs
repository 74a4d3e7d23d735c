/*!
Wire contract shared by the [rtc-tutorials](../rtc_tutorials/index.html) session clients
and the tutorial signaling backends.

Outbound calls are modelled by [`request::Request`], their results by the types in [`response`],
and messages pushed by the backend by [`notification::Notification`].
The STOMP flavour of the loopback demo maps the same requests onto destinations in [`stomp`].
*/

mod common;
pub mod notification;
pub mod request;
pub mod response;
pub mod stomp;

pub use common::{ClientType, IceCandidate, MediaProfile, UserId};

/// Errors raised while decoding inbound messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Notification name not used by any tutorial backend.
    #[error("unknown notification method: {0}")]
    UnknownMethod(String),
    /// STOMP destination the page never subscribed to.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
}
