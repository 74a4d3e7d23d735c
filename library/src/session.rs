/*!
Inputs and outputs shared by every page's session machine.

A machine is fed [`Event`]s (user actions, signaling outcomes, peer outcomes)
and answers with [`Command`]s that an adapter carries out against the
signaling channel, the peer connection wrapper and the DOM.
Machines never perform I/O themselves.
*/

use std::fmt::{Display, Formatter};

use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::Request;
use rtc_tutorials_protocol::response::CallReply;
use rtc_tutorials_protocol::{IceCandidate, MediaProfile, UserId};
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::Result;

/// Identifies one outbound call for the lifetime of a page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequestId(pub(crate) u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "request #{}", self.0)
    }
}

/// Identifies one peer connection wrapper for the lifetime of a page.
/// Handles are never reused, so events for a disposed peer can be told apart.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PeerHandle(pub(crate) u64);

impl Display for PeerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer #{}", self.0)
    }
}

/// Identifies one `incomingCall` request awaiting a reply.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct IncomingCallId(pub u64);

/// Media direction of a peer connection wrapper.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PeerMode {
    SendRecv,
    SendOnly,
    RecvOnly,
}

/// Everything the adapter needs to build a peer connection wrapper.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PeerSpec {
    pub mode: PeerMode,
    pub simulcast: bool,
    pub multistream: bool,
    /// Media session the peer belongs to, on pages that own several.
    pub user_id: Option<UserId>,
}

impl PeerSpec {
    #[must_use]
    pub const fn new(mode: PeerMode) -> Self {
        Self {
            mode,
            simulcast: false,
            multistream: false,
            user_id: None,
        }
    }

    #[must_use]
    pub fn simulcast(mut self, simulcast: bool) -> Self {
        self.simulcast = simulcast;
        self
    }

    #[must_use]
    pub fn multistream(mut self) -> Self {
        self.multistream = true;
        self
    }

    #[must_use]
    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Input to a session machine.
#[derive(Debug)]
pub enum Event {
    // user actions
    Start,
    Stop,
    Register { name: String },
    Call { to: String },
    IncomingCallDecision { call: IncomingCallId, accept: bool },
    SetSimulcast(bool),
    AddViewer,
    StopViewer(UserId),
    SwitchQuality(UserId),
    AddStream,
    RemoveStream,
    StartRecording { path: String, profile: MediaProfile },
    StopRecording,

    // signaling
    Response {
        id: RequestId,
        outcome: Result<Value>,
    },
    Notification(Notification),
    IncomingCall { call: IncomingCallId, caller: String },

    // peer connection wrapper
    PeerReady {
        handle: PeerHandle,
        outcome: Result<()>,
    },
    OfferGenerated {
        handle: PeerHandle,
        outcome: Result<String>,
    },
    /// A remote offer was applied; carries the local answer.
    OfferProcessed {
        handle: PeerHandle,
        outcome: Result<String>,
    },
    AnswerProcessed {
        handle: PeerHandle,
        outcome: Result<()>,
    },
    LocalCandidate {
        handle: PeerHandle,
        candidate: IceCandidate,
    },
    CandidateAdded {
        handle: PeerHandle,
        outcome: Result<()>,
    },
    MediaAcquired(Result<()>),
    /// A local stream was attached to or detached from the peer.
    LocalStreamsUpdated {
        handle: PeerHandle,
        outcome: Result<()>,
    },
}

impl Event {
    /// Short name used in logs and rejection errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Register { .. } => "register",
            Self::Call { .. } => "call",
            Self::IncomingCallDecision { .. } => "incoming call decision",
            Self::SetSimulcast(_) => "simulcast toggle",
            Self::AddViewer => "add viewer",
            Self::StopViewer(_) => "stop viewer",
            Self::SwitchQuality(_) => "switch quality",
            Self::AddStream => "add stream",
            Self::RemoveStream => "remove stream",
            Self::StartRecording { .. } => "start recording",
            Self::StopRecording => "stop recording",
            Self::Response { .. } => "response",
            Self::Notification(_) => "notification",
            Self::IncomingCall { .. } => "incoming call",
            Self::PeerReady { .. } => "peer ready",
            Self::OfferGenerated { .. } => "offer generated",
            Self::OfferProcessed { .. } => "offer processed",
            Self::AnswerProcessed { .. } => "answer processed",
            Self::LocalCandidate { .. } => "local candidate",
            Self::CandidateAdded { .. } => "candidate added",
            Self::MediaAcquired(_) => "media acquired",
            Self::LocalStreamsUpdated { .. } => "local streams updated",
        }
    }
}

/// Output of a session machine, to be carried out by an adapter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    Send { id: RequestId, request: Request },
    CreatePeer { handle: PeerHandle, spec: PeerSpec },
    GenerateOffer(PeerHandle),
    ProcessOffer { handle: PeerHandle, sdp: String },
    ProcessAnswer { handle: PeerHandle, sdp: String },
    AddIceCandidate {
        handle: PeerHandle,
        candidate: IceCandidate,
    },
    /// Ask the user for camera and microphone; the stream is kept by the adapter.
    AcquireMedia,
    /// Attach the most recently acquired stream to the peer.
    AddLocalStream(PeerHandle),
    /// Detach the most recently attached stream from the peer.
    RemoveLocalStream(PeerHandle),
    /// Stop every acquired stream not attached to a peer.
    ReleaseMedia,
    DisposePeer(PeerHandle),
    ConfirmIncomingCall { call: IncomingCallId, caller: String },
    ReplyIncomingCall { call: IncomingCallId, reply: CallReply },
    Alert(String),
    ShowSpinner,
    HideSpinner,
}

/// A page's session state machine.
pub trait Session {
    /// Feed one input.
    ///
    /// # Errors
    /// Rejects user actions that are not valid in the current state,
    /// leaving the state untouched. Collaborator failures are not errors here,
    /// they are handled by moving back to idle.
    fn handle_event(&mut self, event: Event) -> Result<()>;

    /// Next command to carry out, in emission order.
    fn poll_command(&mut self) -> Option<Command>;

    /// Controls enabled in the current state.
    fn affordances(&self) -> Affordances;

    /// Every control present on the page.
    fn controls(&self) -> &'static [Control];
}

/// Progress of a start/stop style page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum SessionState {
    /// Idle, the start control is enabled.
    #[default]
    CanStart,
    /// A start is in flight, every control is disabled.
    Starting,
    /// Media is flowing, the stop control is enabled.
    CanStop,
}
