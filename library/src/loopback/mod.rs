/*!
Loopback page: the browser sends its camera to the media server and gets it back.

The backend creates the offer. Over JSON-RPC the page first registers with
`registerClient` and receives the offer as the result of `startMediaSession`.
Over STOMP there is no registration and the offer is pushed on
[`stomp::START_TOPIC`](rtc_tutorials_protocol::stomp::START_TOPIC) after
the page sends `/app/start`.

| state      | enabled  |
|------------|----------|
| `CanStart` | start    |
| `Starting` | -        |
| `CanStop`  | stop     |
*/

use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::{
    Empty, IceCandidateParams, ProcessAnswerParams, Request,
};
use rtc_tutorials_protocol::response::{decode, SdpReply};
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::context::{Resolved, SessionContext};
use crate::session::{Command, Event, PeerHandle, PeerMode, PeerSpec, Session, SessionState};
use crate::{Error, Result};

/// Signaling transport the page talks over.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Flavor {
    JsonRpc,
    Stomp,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    RegisterClient,
    StartMediaSession,
    ProcessAnswer,
}

const CONTROLS: &[Control] = &[Control::Start, Control::Stop];

#[derive(Debug)]
pub struct LoopbackSession {
    flavor: Flavor,
    state: SessionState,
    peer: Option<PeerHandle>,
    context: SessionContext<Step>,
}

impl LoopbackSession {
    #[must_use]
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            state: SessionState::CanStart,
            peer: None,
            context: SessionContext::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    fn current_peer(&self, handle: PeerHandle) -> bool {
        self.peer == Some(handle) && self.context.is_live(handle)
    }

    fn start(&mut self) -> Result<()> {
        if self.state != SessionState::CanStart {
            return Err(Error::invalid("start", self.state));
        }
        info!("starting loopback session");
        self.state = SessionState::Starting;
        self.context.push(Command::ShowSpinner);
        match self.flavor {
            Flavor::JsonRpc => {
                self.context
                    .request(Request::RegisterClient(Empty {}), Step::RegisterClient);
            }
            Flavor::Stomp => self.create_peer(),
        }
        Ok(())
    }

    fn create_peer(&mut self) {
        self.peer = Some(self.context.create_peer(PeerSpec::new(PeerMode::SendRecv)));
    }

    fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::CanStop {
            return Err(Error::invalid("stop", self.state));
        }
        info!("stopping loopback session");
        if let Some(peer) = self.peer.take() {
            self.context.dispose_peer(peer);
        }
        self.context.clear_pending();
        self.context.notify(Request::StopMediaSession(Empty {}));
        self.context.push(Command::HideSpinner);
        self.state = SessionState::CanStart;
        Ok(())
    }

    fn fail(&mut self, err: &Error) {
        error!("loopback session failed: {}", err);
        self.context.reset();
        self.peer = None;
        self.context.push(Command::HideSpinner);
        self.state = SessionState::CanStart;
    }

    fn on_response(&mut self, step: Step, outcome: Result<Value>) -> Result<()> {
        match (step, outcome) {
            (_, Err(err)) => self.fail(&err),
            (Step::RegisterClient, Ok(_)) => self.create_peer(),
            (Step::StartMediaSession, Ok(result)) => match decode::<SdpReply>(result) {
                Ok(reply) => self.on_offer(reply.sdp),
                Err(err) => self.fail(&err.into()),
            },
            (Step::ProcessAnswer, Ok(_)) => debug!("answer accepted by the media server"),
        }
        Ok(())
    }

    fn on_offer(&mut self, sdp: String) {
        let Some(handle) = self.peer else {
            warn!("offer received without a peer, ignoring");
            return;
        };
        debug!("SDP offer received from server, processing");
        self.state = SessionState::CanStop;
        self.context.push(Command::ProcessOffer { handle, sdp });
    }

    fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::IceCandidate { candidate, .. } => match self.peer {
                Some(handle) => self
                    .context
                    .push(Command::AddIceCandidate { handle, candidate }),
                None => warn!("remote candidate received without a peer, ignoring"),
            },
            Notification::StartOffer { sdp }
                if self.flavor == Flavor::Stomp && self.state == SessionState::Starting =>
            {
                self.on_offer(sdp);
            }
            Notification::ServerError { message } if self.state != SessionState::CanStart => {
                self.fail(&Error::Signaling(message));
            }
            other => warn!("unexpected notification: {:?}", other),
        }
    }
}

impl Session for LoopbackSession {
    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Start => self.start()?,
            Event::Stop => self.stop()?,
            Event::Response { id, outcome } => {
                match self.context.resolve(id, outcome) {
                    Resolved::Step(step, outcome) => self.on_response(step, outcome)?,
                    Resolved::Failed(err) => self.fail(&err),
                    Resolved::Settled => {}
                }
            }
            Event::Notification(notification) => self.on_notification(notification),
            Event::PeerReady { handle, outcome } if self.current_peer(handle) => match outcome {
                Ok(()) => {
                    debug!("peer ready, asking the server to start the media session");
                    let request = Request::StartMediaSession(Empty {});
                    match self.flavor {
                        Flavor::JsonRpc => {
                            self.context.request(request, Step::StartMediaSession);
                        }
                        Flavor::Stomp => {
                            self.context.notify(request);
                        }
                    }
                }
                Err(err) => self.fail(&err),
            },
            Event::OfferProcessed { handle, outcome } if self.current_peer(handle) => {
                match outcome {
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
                }
            }
            Event::LocalCandidate { handle, candidate } if self.current_peer(handle) => {
                self.context
                    .notify(Request::IceCandidate(IceCandidateParams {
                        candidate,
                        user_id: None,
                    }));
            }
            Event::CandidateAdded {
                handle,
                outcome: Err(err),
            } if self.current_peer(handle) => self.fail(&err),
            Event::CandidateAdded { .. } => {}
            Event::PeerReady { handle, .. }
            | Event::OfferProcessed { handle, .. }
            | Event::LocalCandidate { handle, .. } => {
                debug!("ignoring event for stale {}", handle);
            }
            other => return Err(Error::invalid(other.name(), self.state)),
        }
        Ok(())
    }

    fn poll_command(&mut self) -> Option<Command> {
        self.context.poll_command()
    }

    fn affordances(&self) -> Affordances {
        match self.state {
            SessionState::CanStart => Affordances::from([Control::Start]),
            SessionState::Starting => Affordances::none(),
            SessionState::CanStop => Affordances::from([Control::Stop]),
        }
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }
}

#[cfg(test)]
mod test {
    use rtc_tutorials_protocol::IceCandidate;
    use serde_json::json;

    use super::*;
    use crate::session::RequestId;

    fn drain(session: &mut LoopbackSession) -> Vec<Command> {
        std::iter::from_fn(|| session.poll_command()).collect()
    }

    fn sent(commands: &[Command]) -> Vec<(RequestId, Request)> {
        commands
            .iter()
            .filter_map(|command| match *command {
                Command::Send { id, ref request } => Some((id, request.clone())),
                _ => None,
            })
            .collect()
    }

    fn created(commands: &[Command]) -> Option<PeerHandle> {
        commands.iter().find_map(|command| match *command {
            Command::CreatePeer { handle, .. } => Some(handle),
            _ => None,
        })
    }

    /// Drive a JSON-RPC session up to the point where the server's offer is applied.
    fn started() -> (LoopbackSession, PeerHandle) {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        session.handle_event(Event::Start).unwrap();
        let (register, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: register,
                outcome: Ok(Value::Null),
            })
            .unwrap();
        let handle = created(&drain(&mut session)).unwrap();
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (start, request) = sent(&drain(&mut session))[0].clone();
        assert_eq!(request, Request::StartMediaSession(Empty {}));
        session
            .handle_event(Event::Response {
                id: start,
                outcome: Ok(json!({ "value": "v=0 offer" })),
            })
            .unwrap();
        (session, handle)
    }

    #[test]
    fn start_disables_every_control() {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        assert_eq!(session.affordances(), Affordances::from([Control::Start]));
        session.handle_event(Event::Start).unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert!(session.affordances().is_empty());
        let commands = drain(&mut session);
        assert_eq!(commands[0], Command::ShowSpinner);
        assert_eq!(
            sent(&commands)[0].1,
            Request::RegisterClient(Empty {})
        );
    }

    #[test]
    fn session_start_response_enables_stop() {
        let (mut session, handle) = started();
        assert_eq!(session.state(), SessionState::CanStop);
        assert_eq!(session.affordances(), Affordances::from([Control::Stop]));
        assert_eq!(
            drain(&mut session),
            vec![Command::ProcessOffer {
                handle,
                sdp: "v=0 offer".to_owned()
            }]
        );
    }

    #[test]
    fn answer_is_sent_back_to_server() {
        let (mut session, handle) = started();
        drain(&mut session);
        session
            .handle_event(Event::OfferProcessed {
                handle,
                outcome: Ok("v=0 answer".to_owned()),
            })
            .unwrap();
        assert_eq!(
            sent(&drain(&mut session))[0].1,
            Request::ProcessAnswer(ProcessAnswerParams {
                sdp_answer: "v=0 answer".to_owned(),
                user_id: None
            })
        );
    }

    #[test]
    fn stop_disposes_once_and_sends_one_stop() {
        let (mut session, handle) = started();
        drain(&mut session);
        session.handle_event(Event::Stop).unwrap();
        let commands = drain(&mut session);

        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            commands
                .iter()
                .filter(|command| **command == Command::DisposePeer(handle))
                .count(),
            1
        );
        let stops: Vec<_> = sent(&commands)
            .into_iter()
            .filter(|&(_, ref request)| request.is_stop())
            .collect();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].1, Request::StopMediaSession(Empty {}));

        assert!(session.handle_event(Event::Stop).is_err());
        assert!(drain(&mut session).is_empty());
    }

    #[test]
    fn stop_is_rejected_while_starting() {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        session.handle_event(Event::Start).unwrap();
        drain(&mut session);
        assert!(matches!(
            session.handle_event(Event::Stop),
            Err(Error::InvalidAction { .. })
        ));
        assert_eq!(session.state(), SessionState::Starting);
        assert!(drain(&mut session).is_empty());
    }

    #[test]
    fn registration_error_returns_to_idle() {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        session.handle_event(Event::Start).unwrap();
        let (register, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: register,
                outcome: Err(Error::Signaling("socket closed".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(drain(&mut session), vec![Command::HideSpinner]);
    }

    #[test]
    fn start_media_session_error_disposes_peer_and_returns_to_idle() {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        session.handle_event(Event::Start).unwrap();
        let (register, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: register,
                outcome: Ok(Value::Null),
            })
            .unwrap();
        let handle = created(&drain(&mut session)).unwrap();
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (start, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: start,
                outcome: Err(Error::Signaling("pipeline error".to_owned())),
            })
            .unwrap();

        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![Command::DisposePeer(handle), Command::HideSpinner]
        );
    }

    #[test]
    fn malformed_offer_is_a_failure() {
        let mut session = LoopbackSession::new(Flavor::JsonRpc);
        session.handle_event(Event::Start).unwrap();
        let (register, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: register,
                outcome: Ok(Value::Null),
            })
            .unwrap();
        let handle = created(&drain(&mut session)).unwrap();
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (start, _) = sent(&drain(&mut session))[0].clone();
        session
            .handle_event(Event::Response {
                id: start,
                outcome: Ok(json!({ "unexpected": true })),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
    }

    #[test]
    fn late_response_after_failure_is_ignored() {
        let (mut session, handle) = started();
        drain(&mut session);
        session
            .handle_event(Event::OfferProcessed {
                handle,
                outcome: Err(Error::Negotiation("bad sdp".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        drain(&mut session);

        session
            .handle_event(Event::OfferProcessed {
                handle,
                outcome: Ok("v=0 answer".to_owned()),
            })
            .unwrap();
        assert!(drain(&mut session).is_empty());
    }

    #[test]
    fn candidates_flow_both_ways() {
        let (mut session, handle) = started();
        drain(&mut session);
        let candidate = IceCandidate {
            candidate: "candidate:0 1 UDP 1 10.0.0.1 9 typ host".to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        };

        session
            .handle_event(Event::LocalCandidate {
                handle,
                candidate: candidate.clone(),
            })
            .unwrap();
        assert!(matches!(
            sent(&drain(&mut session))[0].1,
            Request::IceCandidate(_)
        ));

        session
            .handle_event(Event::Notification(Notification::IceCandidate {
                candidate: candidate.clone(),
                user_id: None,
            }))
            .unwrap();
        assert_eq!(
            drain(&mut session),
            vec![Command::AddIceCandidate { handle, candidate }]
        );

        session
            .handle_event(Event::CandidateAdded {
                handle,
                outcome: Err(Error::Negotiation("bad candidate".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![Command::DisposePeer(handle), Command::HideSpinner]
        );
    }

    #[test]
    fn stomp_flavor_waits_for_pushed_offer() {
        let mut session = LoopbackSession::new(Flavor::Stomp);
        session.handle_event(Event::Start).unwrap();
        let handle = created(&drain(&mut session)).unwrap();
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (start, request) = sent(&drain(&mut session))[0].clone();
        assert_eq!(request, Request::StartMediaSession(Empty {}));

        session
            .handle_event(Event::Response {
                id: start,
                outcome: Ok(Value::Null),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Starting);

        session
            .handle_event(Event::Notification(Notification::StartOffer {
                sdp: "v=0".to_owned(),
            }))
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStop);
        assert_eq!(
            drain(&mut session),
            vec![Command::ProcessOffer {
                handle,
                sdp: "v=0".to_owned()
            }]
        );
    }

    #[test]
    fn stomp_server_error_returns_to_idle() {
        let mut session = LoopbackSession::new(Flavor::Stomp);
        session.handle_event(Event::Start).unwrap();
        let handle = created(&drain(&mut session)).unwrap();
        session
            .handle_event(Event::Notification(Notification::ServerError {
                message: "no media server".to_owned(),
            }))
            .unwrap();
        assert_eq!(session.state(), SessionState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![Command::DisposePeer(handle), Command::HideSpinner]
        );
    }
}
