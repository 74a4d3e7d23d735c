use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::{
    Empty, IceCandidateParams, NegotiateParams, ProcessAnswerParams, RegisterParams, Request,
    UserParams,
};
use rtc_tutorials_protocol::response::{decode, SdpReply};
use rtc_tutorials_protocol::{IceCandidate, UserId};
use serde_json::Value;

use super::{presenter_id, viewer_id};
use crate::affordance::{Affordances, Control};
use crate::context::{Resolved, SessionContext};
use crate::session::{Command, Event, PeerHandle, PeerMode, PeerSpec, Session, SessionState};
use crate::{Error, Result};

#[derive(Debug, Clone, Eq, PartialEq)]
enum Step {
    Register,
    Negotiate(UserId),
    ProcessAnswer(UserId),
}

impl Step {
    fn user(&self) -> Option<&UserId> {
        match *self {
            Self::Register => None,
            Self::Negotiate(ref user) | Self::ProcessAnswer(ref user) => Some(user),
        }
    }
}

const CONTROLS: &[Control] = &[
    Control::Start,
    Control::Stop,
    Control::Simulcast,
    Control::AddViewer,
];

const STREAMING: &[Control] = &[Control::Stop, Control::AddViewer];

/// Presenter and viewers of one SFU room, all inside a single page.
#[derive(Debug, Default)]
pub struct MultiSessionSession {
    state: SessionState,
    simulcast: bool,
    sessions: BTreeMap<UserId, PeerHandle>,
    next_viewer: u32,
    context: SessionContext<Step>,
}

impl MultiSessionSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Viewers currently attached, in creation order.
    pub fn viewers(&self) -> impl Iterator<Item = &UserId> + '_ {
        let mut viewers: Vec<(&PeerHandle, &UserId)> = self
            .sessions
            .iter()
            .filter(|&(user, _)| user.as_str() != super::PRESENTER)
            .map(|(user, handle)| (handle, user))
            .collect();
        viewers.sort();
        viewers.into_iter().map(|(_, user)| user)
    }

    fn start(&mut self) -> Result<()> {
        if self.state != SessionState::CanStart {
            return Err(Error::invalid("start", self.state));
        }
        info!("starting video call, simulcast {}", self.simulcast);
        self.state = SessionState::Starting;
        self.context.push(Command::ShowSpinner);
        self.context.request(
            Request::Register(RegisterParams {
                name: None,
                simulcast: Some(self.simulcast),
            }),
            Step::Register,
        );
        Ok(())
    }

    fn add_peer(&mut self, user: UserId, spec: PeerSpec) {
        let handle = self.context.create_peer(spec.user(user.clone()));
        self.sessions.insert(user, handle);
    }

    fn add_viewer(&mut self) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("add viewer", self.state));
        }
        let user = viewer_id(self.next_viewer);
        self.next_viewer += 1;
        info!("adding {}", user);
        self.add_peer(user, PeerSpec::new(PeerMode::RecvOnly));
        Ok(())
    }

    /// Tear down one viewer and its media session on the server.
    fn remove_viewer(&mut self, user: &UserId) {
        if let Some(handle) = self.sessions.remove(user) {
            self.context.dispose_peer(handle);
            self.context.retain_steps(|step| step.user() != Some(user));
            self.context.forget_acks_of(user);
            self.context
                .notify(Request::StopUserSession(UserParams {
                    user_id: user.clone(),
                }));
        }
    }

    fn stop_viewer(&mut self, user: &UserId) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("stop viewer", self.state));
        }
        if user.as_str() == super::PRESENTER || !self.sessions.contains_key(user) {
            return Err(Error::UnknownUser(user.clone()));
        }
        info!("stopping {}", user);
        self.remove_viewer(user);
        Ok(())
    }

    fn switch_quality(&mut self, user: UserId) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("switch quality", self.state));
        }
        if user.as_str() == super::PRESENTER || !self.sessions.contains_key(&user) {
            return Err(Error::UnknownUser(user));
        }
        self.context
            .notify(Request::SwitchQuality(UserParams { user_id: user }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("stop", self.state));
        }
        info!("stopping video call");
        let viewers: Vec<UserId> = self.viewers().cloned().collect();
        for viewer in &viewers {
            self.remove_viewer(viewer);
        }
        if let Some(presenter) = self.sessions.remove(&presenter_id()) {
            self.context.dispose_peer(presenter);
        }
        self.context.clear_pending();
        self.context.notify(Request::Stop(Empty {}));
        self.context.push(Command::HideSpinner);
        self.next_viewer = 0;
        self.state = SessionState::CanStart;
        Ok(())
    }

    fn fail(&mut self, err: &Error) {
        error!("video call failed: {}", err);
        let viewers: Vec<UserId> = self.viewers().cloned().collect();
        for viewer in &viewers {
            self.remove_viewer(viewer);
        }
        self.context.reset();
        self.sessions.clear();
        self.next_viewer = 0;
        self.context.push(Command::HideSpinner);
        self.state = SessionState::CanStart;
    }

    fn on_response(&mut self, step: Step, outcome: Result<Value>) {
        let progress = outcome.and_then(|result| match step {
            Step::Register => {
                info!("registered, creating presenter");
                let spec = PeerSpec::new(PeerMode::SendOnly).simulcast(self.simulcast);
                self.add_peer(presenter_id(), spec);
                Ok(())
            }
            Step::Negotiate(user) => self.on_negotiated(user, result),
            Step::ProcessAnswer(_) => Ok(()),
        });
        if let Err(err) = progress {
            self.fail(&err);
        }
    }

    fn on_negotiated(&mut self, user: UserId, result: Value) -> Result<()> {
        let sdp = decode::<SdpReply>(result)?.sdp;
        let handle = *self
            .sessions
            .get(&user)
            .ok_or_else(|| Error::UnknownUser(user.clone()))?;
        debug!("SDP received from server for {}, processing", user);
        self.state = SessionState::CanStop;
        self.context.push(if user.as_str() == super::PRESENTER {
            Command::ProcessAnswer { handle, sdp }
        } else {
            Command::ProcessOffer { handle, sdp }
        });
        Ok(())
    }

    /// Media session owning a live peer.
    fn owner(&self, handle: PeerHandle) -> Option<UserId> {
        self.context
            .peer(handle)
            .and_then(|spec| spec.user_id.clone())
            .filter(|user| self.sessions.get(user) == Some(&handle))
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate, user: Option<UserId>) {
        let user = user.unwrap_or_else(presenter_id);
        match self.sessions.get(&user) {
            Some(&handle) => self
                .context
                .push(Command::AddIceCandidate { handle, candidate }),
            None => warn!("remote candidate for unknown session {}, ignoring", user),
        }
    }

    fn on_peer_event(&mut self, user: UserId, event: Event) {
        match event {
            Event::PeerReady { handle, outcome } => match outcome {
                Err(err) => self.fail(&err),
                Ok(()) if user.as_str() == super::PRESENTER => {
                    self.context.push(Command::GenerateOffer(handle));
                }
                Ok(()) => {
                    self.context.request(
                        Request::NegotiateWebRtc(NegotiateParams {
                            user_id: Some(user.clone()),
                            sdp_offer: None,
                        }),
                        Step::Negotiate(user),
                    );
                }
            },
            Event::OfferGenerated { outcome, .. } => match outcome {
                Ok(sdp_offer) => {
                    self.context.request(
                        Request::NegotiateWebRtc(NegotiateParams {
                            user_id: Some(user.clone()),
                            sdp_offer: Some(sdp_offer),
                        }),
                        Step::Negotiate(user),
                    );
                }
                Err(err) => self.fail(&err),
            },
            Event::OfferProcessed { outcome, .. } => match outcome {
                Ok(sdp_answer) => {
                    self.context.request(
                        Request::ProcessAnswer(ProcessAnswerParams {
                            sdp_answer,
                            user_id: Some(user.clone()),
                        }),
                        Step::ProcessAnswer(user),
                    );
                }
                Err(err) => self.fail(&err),
            },
            Event::AnswerProcessed {
                outcome: Err(err), ..
            } => self.fail(&err),
            Event::LocalCandidate { candidate, .. } => {
                self.context
                    .notify(Request::IceCandidate(IceCandidateParams {
                        candidate,
                        user_id: Some(user),
                    }));
            }
            Event::CandidateAdded {
                outcome: Err(err), ..
            } => self.fail(&err),
            _ => {}
        }
    }
}

impl Session for MultiSessionSession {
    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Start => self.start()?,
            Event::Stop => self.stop()?,
            Event::SetSimulcast(simulcast) if self.state == SessionState::CanStart => {
                self.simulcast = simulcast;
            }
            Event::AddViewer => self.add_viewer()?,
            Event::StopViewer(user) => self.stop_viewer(&user)?,
            Event::SwitchQuality(user) => self.switch_quality(user)?,
            Event::Response { id, outcome } => {
                match self.context.resolve(id, outcome) {
                    Resolved::Step(step, outcome) => self.on_response(step, outcome),
                    Resolved::Failed(err) => self.fail(&err),
                    Resolved::Settled => {}
                }
            }
            Event::Notification(Notification::IceCandidate { candidate, user_id }) => {
                self.on_remote_candidate(candidate, user_id);
            }
            Event::Notification(other) => warn!("unexpected notification: {:?}", other),
            event @ (Event::PeerReady { .. }
            | Event::OfferGenerated { .. }
            | Event::OfferProcessed { .. }
            | Event::AnswerProcessed { .. }
            | Event::LocalCandidate { .. }
            | Event::CandidateAdded { .. }) => {
                let handle = match event {
                    Event::PeerReady { handle, .. }
                    | Event::OfferGenerated { handle, .. }
                    | Event::OfferProcessed { handle, .. }
                    | Event::AnswerProcessed { handle, .. }
                    | Event::LocalCandidate { handle, .. }
                    | Event::CandidateAdded { handle, .. } => handle,
                    _ => return Ok(()),
                };
                match self.owner(handle) {
                    Some(user) => self.on_peer_event(user, event),
                    None => debug!("ignoring event for stale {}", handle),
                }
            }
            other => return Err(Error::invalid(other.name(), self.state)),
        }
        Ok(())
    }

    fn poll_command(&mut self) -> Option<Command> {
        self.context.poll_command()
    }

    fn affordances(&self) -> Affordances {
        super::affordances(self.state, STREAMING)
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }
}
