use rtc_tutorials_protocol::{ProtocolError, UserId};

use crate::session::PeerHandle;

/// Failures surfaced by the session machines and their collaborators.
///
/// The first three variants are the failure classes a page can observe
/// from its collaborators; every one of them sends the page back to idle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The signaling transport reported an error for a call.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Offer/answer or candidate processing failed in the peer wrapper.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// The user denied access to camera or microphone.
    #[error("media capture denied: {0}")]
    MediaDenied(String),

    /// A user action arrived in a state that does not allow it.
    #[error("{action} is not allowed in state {state}")]
    InvalidAction { action: &'static str, state: String },

    #[error("no live peer for {0}")]
    UnknownPeer(PeerHandle),

    #[error("no media session for user {0}")]
    UnknownUser(UserId),

    #[error("malformed result: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Error {
    pub(crate) fn invalid(action: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::InvalidAction {
            action,
            state: format!("{state:?}"),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
