use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::{
    Empty, IceCandidateParams, NegotiateParams, ProcessAnswerParams, RecordingParams,
    RegisterParams, Request,
};
use rtc_tutorials_protocol::response::{decode, RegisterReply, SdpReply};
use rtc_tutorials_protocol::{ClientType, MediaProfile};
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::context::{Resolved, SessionContext};
use crate::session::{Command, Event, PeerHandle, PeerMode, PeerSpec, Session, SessionState};
use crate::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    Register,
    Negotiate,
    ProcessAnswer,
}

const CONTROLS: &[Control] = &[
    Control::Start,
    Control::Stop,
    Control::Simulcast,
    Control::StartRecording,
    Control::StopRecording,
];

const STREAMING: &[Control] = &[
    Control::Stop,
    Control::StartRecording,
    Control::StopRecording,
];

/// One browser per participant; the server decides who presents.
#[derive(Debug, Default)]
pub struct MultiBrowserSession {
    state: SessionState,
    simulcast: bool,
    role: Option<ClientType>,
    peer: Option<PeerHandle>,
    context: SessionContext<Step>,
}

impl MultiBrowserSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Role assigned by the server for the current session.
    #[must_use]
    pub const fn role(&self) -> Option<ClientType> {
        self.role
    }

    #[must_use]
    pub const fn simulcast(&self) -> bool {
        self.simulcast
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

    fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("stop", self.state));
        }
        info!("stopping video call");
        if let Some(peer) = self.peer.take() {
            self.context.dispose_peer(peer);
        }
        self.context.clear_pending();
        self.context.notify(Request::Stop(Empty {}));
        self.context.push(Command::HideSpinner);
        self.role = None;
        self.state = SessionState::CanStart;
        Ok(())
    }

    fn fail(&mut self, err: &Error) {
        error!("video call failed: {}", err);
        self.context.reset();
        self.peer = None;
        self.role = None;
        self.context.push(Command::HideSpinner);
        self.state = SessionState::CanStart;
    }

    fn recording(&mut self, request: Request) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid(request.method(), self.state));
        }
        self.context.notify(request);
        Ok(())
    }

    fn start_recording(&mut self, path: String, profile: MediaProfile) -> Result<()> {
        info!("recording to {} as {:?}", path, profile);
        self.recording(Request::StartRecording(RecordingParams {
            path,
            media_profile: profile,
        }))
    }

    fn on_registered(&mut self, result: Value) -> Result<()> {
        let role = decode::<RegisterReply>(result)?.client_type;
        info!("registered as {}", role);
        let spec = match role {
            ClientType::Presenter => {
                PeerSpec::new(PeerMode::SendOnly).simulcast(self.simulcast)
            }
            ClientType::Viewer => PeerSpec::new(PeerMode::RecvOnly),
        };
        self.role = Some(role);
        self.peer = Some(self.context.create_peer(spec));
        Ok(())
    }

    fn on_negotiated(&mut self, result: Value) -> Result<()> {
        let sdp = decode::<SdpReply>(result)?.sdp;
        let handle = self.peer.ok_or_else(|| Error::invalid("negotiate", self.state))?;
        debug!("SDP received from server, processing");
        self.state = SessionState::CanStop;
        self.context.push(match self.role {
            Some(ClientType::Viewer) => Command::ProcessOffer { handle, sdp },
            _ => Command::ProcessAnswer { handle, sdp },
        });
        Ok(())
    }

    fn on_response(&mut self, step: Step, outcome: Result<Value>) {
        let progress = outcome.and_then(|result| match step {
            Step::Register => self.on_registered(result),
            Step::Negotiate => self.on_negotiated(result),
            Step::ProcessAnswer => Ok(()),
        });
        if let Err(err) = progress {
            self.fail(&err);
        }
    }

    fn current_peer(&self, handle: PeerHandle) -> bool {
        self.peer == Some(handle) && self.context.is_live(handle)
    }

    fn on_peer_event(&mut self, event: Event) {
        match event {
            Event::PeerReady { handle, outcome } => match (outcome, self.role) {
                (Err(err), _) => self.fail(&err),
                (Ok(()), Some(ClientType::Presenter)) => {
                    self.context.push(Command::GenerateOffer(handle));
                }
                (Ok(()), _) => {
                    self.context.request(
                        Request::NegotiateWebRtc(NegotiateParams::default()),
                        Step::Negotiate,
                    );
                }
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
            Event::OfferProcessed { outcome, .. } => match outcome {
                Ok(sdp_answer) => {
                    self.context.request(
                        Request::ProcessAnswer(ProcessAnswerParams {
                            sdp_answer,
                            user_id: None,
                        }),
                        Step::ProcessAnswer,
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

impl Session for MultiBrowserSession {
    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Start => self.start()?,
            Event::Stop => self.stop()?,
            Event::SetSimulcast(simulcast) if self.state == SessionState::CanStart => {
                self.simulcast = simulcast;
            }
            Event::StartRecording { path, profile } => self.start_recording(path, profile)?,
            Event::StopRecording => self.recording(Request::StopRecording(Empty {}))?,
            Event::Response { id, outcome } => {
                match self.context.resolve(id, outcome) {
                    Resolved::Step(step, outcome) => self.on_response(step, outcome),
                    Resolved::Failed(err) => self.fail(&err),
                    Resolved::Settled => {}
                }
            }
            Event::Notification(Notification::IceCandidate { candidate, .. }) => match self.peer {
                Some(handle) => self
                    .context
                    .push(Command::AddIceCandidate { handle, candidate }),
                None => warn!("remote candidate received without a peer, ignoring"),
            },
            Event::Notification(other) => warn!("unexpected notification: {:?}", other),
            Event::PeerReady { handle, .. }
            | Event::OfferGenerated { handle, .. }
            | Event::OfferProcessed { handle, .. }
            | Event::AnswerProcessed { handle, .. }
            | Event::LocalCandidate { handle, .. }
            | Event::CandidateAdded { handle, .. }
                if !self.current_peer(handle) =>
            {
                debug!("ignoring event for stale {}", handle);
            }
            event @ (Event::PeerReady { .. }
            | Event::OfferGenerated { .. }
            | Event::OfferProcessed { .. }
            | Event::AnswerProcessed { .. }
            | Event::LocalCandidate { .. }
            | Event::CandidateAdded { .. }) => self.on_peer_event(event),
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

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::session::RequestId;

    fn drain(session: &mut MultiBrowserSession) -> Vec<Command> {
        std::iter::from_fn(|| session.poll_command()).collect()
    }

    fn last_sent(commands: &[Command]) -> (RequestId, Request) {
        commands
            .iter()
            .rev()
            .find_map(|command| match *command {
                Command::Send { id, ref request } => Some((id, request.clone())),
                _ => None,
            })
            .unwrap()
    }

    fn respond(session: &mut MultiBrowserSession, id: RequestId, result: Value) {
        session
            .handle_event(Event::Response {
                id,
                outcome: Ok(result),
            })
            .unwrap();
    }

    fn registered_as(role: &str, simulcast: bool) -> (MultiBrowserSession, PeerHandle, PeerSpec) {
        let mut session = MultiBrowserSession::new();
        session.handle_event(Event::SetSimulcast(simulcast)).unwrap();
        session.handle_event(Event::Start).unwrap();
        let (id, request) = last_sent(&drain(&mut session));
        assert_eq!(
            request,
            Request::Register(RegisterParams {
                name: None,
                simulcast: Some(simulcast)
            })
        );
        respond(&mut session, id, json!({ "type": role }));
        let (handle, spec) = drain(&mut session)
            .into_iter()
            .find_map(|command| match command {
                Command::CreatePeer { handle, spec } => Some((handle, spec)),
                _ => None,
            })
            .unwrap();
        (session, handle, spec)
    }

    #[test]
    fn presenter_sends_simulcast_offer() {
        let (mut session, handle, spec) = registered_as("presenter", true);
        assert_eq!(session.role(), Some(ClientType::Presenter));
        assert_eq!(spec.mode, PeerMode::SendOnly);
        assert!(spec.simulcast);
        assert_eq!(session.state(), SessionState::Starting);

        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        assert_eq!(drain(&mut session), vec![Command::GenerateOffer(handle)]);
        session
            .handle_event(Event::OfferGenerated {
                handle,
                outcome: Ok("offer".to_owned()),
            })
            .unwrap();
        let (id, _) = last_sent(&drain(&mut session));
        respond(&mut session, id, json!({ "sdp": "answer" }));

        assert_eq!(session.state(), SessionState::CanStop);
        assert_eq!(
            drain(&mut session),
            vec![Command::ProcessAnswer {
                handle,
                sdp: "answer".to_owned()
            }]
        );
        assert_eq!(
            session.affordances(),
            Affordances::from([Control::Stop, Control::StartRecording, Control::StopRecording])
        );
    }

    #[test]
    fn viewer_answers_server_offer() {
        let (mut session, handle, spec) = registered_as("viewer", false);
        assert_eq!(spec.mode, PeerMode::RecvOnly);

        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (id, request) = last_sent(&drain(&mut session));
        assert_eq!(
            request,
            Request::NegotiateWebRtc(NegotiateParams::default())
        );
        respond(&mut session, id, json!({ "sdp": "offer" }));
        assert_eq!(
            drain(&mut session),
            vec![Command::ProcessOffer {
                handle,
                sdp: "offer".to_owned()
            }]
        );

        session
            .handle_event(Event::OfferProcessed {
                handle,
                outcome: Ok("answer".to_owned()),
            })
            .unwrap();
        assert_eq!(
            last_sent(&drain(&mut session)).1,
            Request::ProcessAnswer(ProcessAnswerParams {
                sdp_answer: "answer".to_owned(),
                user_id: None
            })
        );
    }

    #[test]
    fn simulcast_cannot_change_while_running() {
        let (mut session, _, _) = registered_as("presenter", false);
        assert!(session.handle_event(Event::SetSimulcast(true)).is_err());
        assert!(!session.simulcast());
    }

    #[test]
    fn recording_only_while_streaming() {
        let mut session = MultiBrowserSession::new();
        assert!(session.handle_event(Event::StopRecording).is_err());

        let (mut session, handle, _) = registered_as("presenter", false);
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        session
            .handle_event(Event::OfferGenerated {
                handle,
                outcome: Ok("offer".to_owned()),
            })
            .unwrap();
        let (id, _) = last_sent(&drain(&mut session));
        respond(&mut session, id, json!({ "sdp": "answer" }));
        drain(&mut session);

        session
            .handle_event(Event::StartRecording {
                path: "file:///tmp/demo.mp4".to_owned(),
                profile: MediaProfile::Mp4,
            })
            .unwrap();
        let (id, request) = last_sent(&drain(&mut session));
        assert_eq!(
            request,
            Request::StartRecording(RecordingParams {
                path: "file:///tmp/demo.mp4".to_owned(),
                media_profile: MediaProfile::Mp4
            })
        );
        session
            .handle_event(Event::Response {
                id,
                outcome: Err(Error::Signaling("no recorder".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        let commands = drain(&mut session);
        assert!(commands.contains(&Command::DisposePeer(handle)));
        assert!(commands.contains(&Command::HideSpinner));
    }

    #[test]
    fn stop_disposes_and_sends_single_stop() {
        let (mut session, handle, _) = registered_as("viewer", false);
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (id, _) = last_sent(&drain(&mut session));
        respond(&mut session, id, json!({ "sdp": "offer" }));
        drain(&mut session);

        session.handle_event(Event::Stop).unwrap();
        let commands = drain(&mut session);
        assert_eq!(commands[0], Command::DisposePeer(handle));
        assert_eq!(last_sent(&commands).1, Request::Stop(Empty {}));
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            session.affordances(),
            Affordances::from([Control::Start, Control::Simulcast])
        );
        assert!(session.role().is_none());
    }

    #[test]
    fn peer_creation_failure_returns_to_idle() {
        let (mut session, handle, _) = registered_as("presenter", false);
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Err(Error::MediaDenied("NotAllowedError".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![Command::DisposePeer(handle), Command::HideSpinner]
        );
    }

    #[test]
    fn unknown_role_is_a_failure() {
        let mut session = MultiBrowserSession::new();
        session.handle_event(Event::Start).unwrap();
        let (id, _) = last_sent(&drain(&mut session));
        respond(&mut session, id, json!({ "type": "moderator" }));
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(drain(&mut session), vec![Command::HideSpinner]);
    }
}
