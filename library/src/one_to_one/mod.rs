/*!
One-to-one page: users register under a name and call each other by name.

Two machines are composed. Registration goes
`NotRegistered -> Registering -> Registered`, and the call machine
(`NoCall -> ProcessingCall -> InCall`) is reset whenever registration settles.
An incoming call that arrives while another call is being set up or is in
progress is rejected as busy without asking the user.

The caller and the callee both negotiate the same way: a send-recv peer
generates an offer, `negotiateWebRtc` returns the media server's answer.
*/

use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::{
    CallParams, Empty, IceCandidateParams, NegotiateParams, RegisterParams, Request,
};
use rtc_tutorials_protocol::response::{decode, CallReply, SdpReply, ValueReply};
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::context::{Resolved, SessionContext};
use crate::session::{
    Command, Event, IncomingCallId, PeerHandle, PeerMode, PeerSpec, Session,
};
use crate::{Error, Result};

pub const MISSING_NAME: &str = "You must provide a name";
pub const MISSING_CALLEE: &str = "You must specify the client name";
pub const REGISTRATION_FAILED: &str =
    "Error registering user. See console for further information.";
pub const BUSY: &str = "User busy";
pub const ACCEPTS: &str = "User accepts call";
pub const DECLINED: &str = "Declined by user";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum RegisterState {
    #[default]
    NotRegistered,
    Registering,
    Registered,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum CallState {
    #[default]
    NoCall,
    ProcessingCall,
    InCall,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    Register,
    Call,
    Negotiate,
}

const CONTROLS: &[Control] = &[
    Control::Register,
    Control::Call,
    Control::Terminate,
    Control::Play,
];

#[derive(Debug, Default)]
pub struct OneToOneSession {
    register_state: RegisterState,
    call_state: CallState,
    name: Option<String>,
    peer: Option<PeerHandle>,
    incoming: Option<IncomingCallId>,
    context: SessionContext<Step>,
}

impl OneToOneSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn register_state(&self) -> RegisterState {
        self.register_state
    }

    #[must_use]
    pub const fn call_state(&self) -> CallState {
        self.call_state
    }

    /// Name accepted by the server, once registered.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_register_state(&mut self, state: RegisterState) {
        debug!("register state {:?} -> {:?}", self.register_state, state);
        self.register_state = state;
        if state != RegisterState::Registering {
            self.drop_call();
        }
    }

    /// Forget any call in progress without telling the backend.
    fn drop_call(&mut self) {
        if let Some(peer) = self.peer.take() {
            self.context.dispose_peer(peer);
        }
        self.context.retain_steps(|step| *step == Step::Register);
        self.context.forget_acks();
        self.incoming = None;
        self.call_state = CallState::NoCall;
    }

    fn register(&mut self, name: String) -> Result<()> {
        if self.register_state != RegisterState::NotRegistered {
            return Err(Error::invalid("register", self.register_state));
        }
        if name.is_empty() {
            self.context.push(Command::Alert(MISSING_NAME.to_owned()));
            return Ok(());
        }
        info!("registering as {}", name);
        self.set_register_state(RegisterState::Registering);
        self.name = Some(name.clone());
        self.context.request(
            Request::Register(RegisterParams {
                name: Some(name),
                simulcast: None,
            }),
            Step::Register,
        );
        Ok(())
    }

    fn on_registered(&mut self, outcome: Result<Value>) {
        let reply = outcome.and_then(|result| Ok(decode::<ValueReply>(result)?));
        match reply {
            Ok(reply) if reply.is_accepted() => {
                info!("registered as {}", self.name.as_deref().unwrap_or_default());
                self.set_register_state(RegisterState::Registered);
            }
            Ok(reply) => {
                error!(
                    "registration rejected: {}",
                    reply
                        .value
                        .as_deref()
                        .unwrap_or("Unknown reason for register rejection.")
                );
                self.name = None;
                self.set_register_state(RegisterState::NotRegistered);
                self.context
                    .push(Command::Alert(REGISTRATION_FAILED.to_owned()));
            }
            Err(err) => {
                error!("registration failed: {}", err);
                self.name = None;
                self.set_register_state(RegisterState::NotRegistered);
            }
        }
    }

    fn call(&mut self, to: String) -> Result<()> {
        if self.register_state != RegisterState::Registered || self.call_state != CallState::NoCall
        {
            return Err(Error::invalid(
                "call",
                (self.register_state, self.call_state),
            ));
        }
        if to.is_empty() {
            self.context.push(Command::Alert(MISSING_CALLEE.to_owned()));
            return Ok(());
        }
        info!("calling {}", to);
        self.call_state = CallState::ProcessingCall;
        self.context.push(Command::ShowSpinner);
        self.context
            .request(Request::Call(CallParams { to }), Step::Call);
        Ok(())
    }

    fn on_call_reply(&mut self, outcome: Result<Value>) {
        let reply = outcome.and_then(|result| Ok(decode::<CallReply>(result)?));
        match reply {
            Ok(reply) if reply.is_accepted() => {
                self.call_state = CallState::InCall;
                self.negotiate();
            }
            Ok(reply) => {
                info!(
                    "call not accepted by peer, closing call: {}",
                    reply
                        .message
                        .as_deref()
                        .unwrap_or("Unknown reason for call rejection.")
                );
                self.stop_call();
            }
            Err(err) => {
                error!("call failed: {}", err);
                self.stop_call();
            }
        }
    }

    fn on_incoming_call(&mut self, call: IncomingCallId, caller: String) {
        if self.call_state != CallState::NoCall {
            info!("rejecting call from {}, busy", caller);
            self.context.push(Command::ReplyIncomingCall {
                call,
                reply: CallReply::rejected(BUSY),
            });
            return;
        }
        self.call_state = CallState::ProcessingCall;
        self.incoming = Some(call);
        self.context
            .push(Command::ConfirmIncomingCall { call, caller });
    }

    fn on_decision(&mut self, call: IncomingCallId, accept: bool) -> Result<()> {
        if self.incoming != Some(call) {
            return Err(Error::invalid("incoming call decision", self.call_state));
        }
        self.incoming = None;
        if accept {
            self.context.push(Command::ShowSpinner);
            self.context.push(Command::ReplyIncomingCall {
                call,
                reply: CallReply::accepted(ACCEPTS),
            });
            self.negotiate();
        } else {
            self.context.push(Command::ReplyIncomingCall {
                call,
                reply: CallReply::rejected(DECLINED),
            });
            self.stop_call();
        }
        Ok(())
    }

    fn negotiate(&mut self) {
        self.peer = Some(self.context.create_peer(PeerSpec::new(PeerMode::SendRecv)));
    }

    /// Accepted in `ProcessingCall` as well as `InCall`, so a call still
    /// waiting for the callee can be abandoned. Its late reply is ignored.
    fn stop(&mut self) -> Result<()> {
        if self.call_state == CallState::NoCall {
            return Err(Error::invalid("stop", self.call_state));
        }
        self.stop_call();
        Ok(())
    }

    /// Hang up: tell the backend only if media was set up.
    fn stop_call(&mut self) {
        info!("stopping call");
        let had_peer = self.peer.is_some();
        self.drop_call();
        if had_peer {
            self.context.notify(Request::Stop(Empty {}));
        }
        self.context.push(Command::HideSpinner);
    }

    fn fail(&mut self, err: &Error) {
        error!("call failed: {}", err);
        self.drop_call();
        self.context.push(Command::HideSpinner);
    }

    fn current_peer(&self, handle: PeerHandle) -> bool {
        self.peer == Some(handle) && self.context.is_live(handle)
    }

    fn on_peer_event(&mut self, event: Event) {
        match event {
            Event::PeerReady { handle, outcome } => match outcome {
                Ok(()) => self.context.push(Command::GenerateOffer(handle)),
                Err(err) => self.fail(&err),
            },
            Event::OfferGenerated { outcome, .. } => match outcome {
                Ok(sdp_offer) => {
                    self.context.request(
                        Request::NegotiateWebRtc(NegotiateParams {
                            user_id: None,
                            sdp_offer: Some(sdp_offer),
                        }),
                        Step::Negotiate,
                    );
                }
                Err(err) => self.fail(&err),
            },
            Event::AnswerProcessed { outcome, .. } => match outcome {
                Ok(()) => {
                    debug!("answer processed, call established");
                    self.call_state = CallState::InCall;
                }
                Err(err) => self.fail(&err),
            },
            Event::LocalCandidate { candidate, .. } => {
                self.context
                    .notify(Request::IceCandidate(IceCandidateParams {
                        candidate,
                        user_id: None,
                    }));
            }
            Event::CandidateAdded {
                outcome: Err(err), ..
            } => self.fail(&err),
            _ => {}
        }
    }
}

impl Session for OneToOneSession {
    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Register { name } => self.register(name)?,
            Event::Call { to } => self.call(to)?,
            Event::Stop => self.stop()?,
            Event::IncomingCall { call, caller } => self.on_incoming_call(call, caller),
            Event::IncomingCallDecision { call, accept } => self.on_decision(call, accept)?,
            Event::Response { id, outcome } => match self.context.resolve(id, outcome) {
                Resolved::Step(Step::Register, outcome) => self.on_registered(outcome),
                Resolved::Step(Step::Call, outcome) => self.on_call_reply(outcome),
                Resolved::Step(Step::Negotiate, outcome) => {
                    match outcome.and_then(|result| Ok(decode::<SdpReply>(result)?)) {
                        Ok(reply) => match self.peer {
                            Some(handle) => self.context.push(Command::ProcessAnswer {
                                handle,
                                sdp: reply.sdp,
                            }),
                            None => warn!("answer received without a peer, ignoring"),
                        },
                        Err(err) => self.fail(&err),
                    }
                }
                Resolved::Failed(err) => self.fail(&err),
                Resolved::Settled => {}
            },
            Event::Notification(Notification::IceCandidate { candidate, .. }) => match self.peer {
                Some(handle) => self
                    .context
                    .push(Command::AddIceCandidate { handle, candidate }),
                None => warn!("remote candidate received without a call, ignoring"),
            },
            Event::Notification(other) => warn!("unexpected notification: {:?}", other),
            Event::PeerReady { handle, .. }
            | Event::OfferGenerated { handle, .. }
            | Event::AnswerProcessed { handle, .. }
            | Event::LocalCandidate { handle, .. }
            | Event::CandidateAdded { handle, .. }
                if !self.current_peer(handle) =>
            {
                debug!("ignoring event for stale {}", handle);
            }
            event @ (Event::PeerReady { .. }
            | Event::OfferGenerated { .. }
            | Event::AnswerProcessed { .. }
            | Event::LocalCandidate { .. }
            | Event::CandidateAdded { .. }) => self.on_peer_event(event),
            other => {
                return Err(Error::invalid(
                    other.name(),
                    (self.register_state, self.call_state),
                ))
            }
        }
        Ok(())
    }

    fn poll_command(&mut self) -> Option<Command> {
        self.context.poll_command()
    }

    fn affordances(&self) -> Affordances {
        let mut enabled = Vec::with_capacity(2);
        if self.register_state == RegisterState::NotRegistered {
            enabled.push(Control::Register);
        }
        match self.call_state {
            CallState::NoCall if self.register_state == RegisterState::Registered => {
                enabled.push(Control::Call);
            }
            CallState::InCall => enabled.push(Control::Terminate),
            _ => {}
        }
        enabled.into_iter().collect()
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }
}
