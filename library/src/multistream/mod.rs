/*!
Multi-stream page: a single peer connection carries a growing set of local streams.

The presenter captures the camera, attaches it and negotiates. Every
further stream is captured, attached and renegotiated on the same peer
connection; the page then sits in [`StreamState::StreamsAdded`] until the
extra streams are removed again. Viewers receive all of them on one
recv-only peer and answer any renegotiation the server pushes as
`viewerNegotiation`.
*/

use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::{
    Empty, IceCandidateParams, NegotiateParams, ProcessAnswerParams, RegisterParams, Request,
};
use rtc_tutorials_protocol::response::{decode, RegisterReply, SdpReply};
use rtc_tutorials_protocol::ClientType;
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::context::{Resolved, SessionContext};
use crate::session::{Command, Event, PeerHandle, PeerMode, PeerSpec, Session};
use crate::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum StreamState {
    #[default]
    CanStart,
    Starting,
    CanStop,
    /// Negotiated with more than the initial stream attached.
    StreamsAdded,
}

impl StreamState {
    const fn is_streaming(self) -> bool {
        matches!(self, Self::CanStop | Self::StreamsAdded)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Step {
    Register,
    Negotiate,
    ProcessAnswer,
}

/// What the pending camera capture is for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Capture {
    Initial,
    Extra,
}

const CONTROLS: &[Control] = &[
    Control::Start,
    Control::Stop,
    Control::Simulcast,
    Control::AddStream,
    Control::RemoveStream,
];

#[derive(Debug, Default)]
pub struct MultiStreamSession {
    state: StreamState,
    simulcast: bool,
    role: Option<ClientType>,
    peer: Option<PeerHandle>,
    capture: Option<Capture>,
    /// Streams attached to the presenter's peer connection.
    local_streams: usize,
    context: SessionContext<Step>,
}

impl MultiStreamSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub const fn role(&self) -> Option<ClientType> {
        self.role
    }

    #[must_use]
    pub const fn local_streams(&self) -> usize {
        self.local_streams
    }

    const fn is_presenter(&self) -> bool {
        matches!(self.role, Some(ClientType::Presenter))
    }

    fn start(&mut self) -> Result<()> {
        if self.state != StreamState::CanStart {
            return Err(Error::invalid("start", self.state));
        }
        info!("starting video call, simulcast {}", self.simulcast);
        self.state = StreamState::Starting;
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
        if !self.state.is_streaming() {
            return Err(Error::invalid("stop", self.state));
        }
        info!("stopping video call");
        if let Some(peer) = self.peer.take() {
            self.context.dispose_peer(peer);
        }
        self.context.push(Command::ReleaseMedia);
        self.context.clear_pending();
        self.context.notify(Request::Stop(Empty {}));
        self.context.push(Command::HideSpinner);
        self.idle();
        Ok(())
    }

    fn fail(&mut self, err: &Error) {
        error!("video call failed: {}", err);
        self.context.reset();
        self.peer = None;
        self.context.push(Command::ReleaseMedia);
        self.context.push(Command::HideSpinner);
        self.idle();
    }

    fn idle(&mut self) {
        self.role = None;
        self.capture = None;
        self.local_streams = 0;
        self.state = StreamState::CanStart;
    }

    fn add_stream(&mut self) -> Result<()> {
        if !self.is_presenter() || !self.state.is_streaming() {
            return Err(Error::invalid("add stream", self.state));
        }
        info!("adding new video stream from the camera");
        self.state = StreamState::Starting;
        self.capture = Some(Capture::Extra);
        self.context.push(Command::AcquireMedia);
        Ok(())
    }

    fn remove_stream(&mut self) -> Result<()> {
        if !self.is_presenter() || self.state != StreamState::StreamsAdded {
            return Err(Error::invalid("remove stream", self.state));
        }
        let handle = self.peer.ok_or_else(|| Error::invalid("remove stream", self.state))?;
        if self.local_streams <= 1 {
            error!(
                "there are currently {} streams, can only remove if > 1",
                self.local_streams
            );
            return Err(Error::invalid("remove stream", self.state));
        }
        info!("removing last video stream of {}", self.local_streams);
        self.local_streams -= 1;
        self.state = StreamState::Starting;
        self.context.push(Command::RemoveLocalStream(handle));
        Ok(())
    }

    fn on_media(&mut self, outcome: Result<()>) {
        let Some(capture) = self.capture.take() else {
            debug!("releasing media nobody asked for");
            if outcome.is_ok() {
                self.context.push(Command::ReleaseMedia);
            }
            return;
        };
        if let Err(err) = outcome {
            error!("access denied to webcam");
            self.fail(&err);
            return;
        }
        match (capture, self.peer) {
            (Capture::Initial, _) => {
                let spec = PeerSpec::new(PeerMode::SendOnly)
                    .simulcast(self.simulcast)
                    .multistream();
                self.peer = Some(self.context.create_peer(spec));
            }
            (Capture::Extra, Some(handle)) => self.attach(handle),
            (Capture::Extra, None) => {
                warn!("extra stream captured without a peer, releasing");
                self.context.push(Command::ReleaseMedia);
            }
        }
    }

    /// Renegotiation follows once the stream is on the peer.
    fn attach(&mut self, handle: PeerHandle) {
        self.local_streams += 1;
        self.context.push(Command::AddLocalStream(handle));
    }

    fn on_registered(&mut self, result: Value) -> Result<()> {
        let role = decode::<RegisterReply>(result)?.client_type;
        info!("registered as {}", role);
        self.role = Some(role);
        match role {
            ClientType::Presenter => {
                self.capture = Some(Capture::Initial);
                self.context.push(Command::AcquireMedia);
            }
            ClientType::Viewer => {
                let spec = PeerSpec::new(PeerMode::RecvOnly).multistream();
                self.peer = Some(self.context.create_peer(spec));
            }
        }
        Ok(())
    }

    fn on_negotiated(&mut self, result: Value) -> Result<()> {
        let sdp = decode::<SdpReply>(result)?.sdp;
        let handle = self.peer.ok_or_else(|| Error::invalid("negotiate", self.state))?;
        if self.is_presenter() {
            debug!("SDP answer received from server, processing");
            self.state = if self.local_streams > 1 {
                StreamState::StreamsAdded
            } else {
                StreamState::CanStop
            };
            self.context.push(Command::ProcessAnswer { handle, sdp });
        } else {
            debug!("SDP offer received from server, processing");
            self.state = StreamState::CanStop;
            self.context.push(Command::ProcessOffer { handle, sdp });
        }
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

    fn on_notification(&mut self, notification: Notification) {
        match (notification, self.peer) {
            (Notification::IceCandidate { candidate, .. }, Some(handle)) => {
                self.context
                    .push(Command::AddIceCandidate { handle, candidate });
            }
            (Notification::ViewerNegotiation { sdp_offer }, Some(handle))
                if !self.is_presenter() =>
            {
                debug!("renegotiation offer pushed by the server");
                self.context.push(Command::ProcessOffer {
                    handle,
                    sdp: sdp_offer,
                });
            }
            (other, _) => warn!("unexpected notification: {:?}", other),
        }
    }

    fn current_peer(&self, handle: PeerHandle) -> bool {
        self.peer == Some(handle) && self.context.is_live(handle)
    }

    fn on_peer_event(&mut self, event: Event) {
        match event {
            Event::PeerReady { handle, outcome } => match outcome {
                Err(err) => self.fail(&err),
                Ok(()) if self.is_presenter() => self.attach(handle),
                Ok(()) => {
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
            Event::LocalStreamsUpdated { handle, outcome } => match outcome {
                Ok(()) => self.context.push(Command::GenerateOffer(handle)),
                Err(err) => self.fail(&err),
            },
            _ => {}
        }
    }
}

impl Session for MultiStreamSession {
    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Start => self.start()?,
            Event::Stop => self.stop()?,
            Event::SetSimulcast(simulcast) if self.state == StreamState::CanStart => {
                self.simulcast = simulcast;
            }
            Event::AddStream => self.add_stream()?,
            Event::RemoveStream => self.remove_stream()?,
            Event::MediaAcquired(outcome) => self.on_media(outcome),
            Event::Response { id, outcome } => {
                match self.context.resolve(id, outcome) {
                    Resolved::Step(step, outcome) => self.on_response(step, outcome),
                    Resolved::Failed(err) => self.fail(&err),
                    Resolved::Settled => {}
                }
            }
            Event::Notification(notification) => self.on_notification(notification),
            Event::PeerReady { handle, .. }
            | Event::OfferGenerated { handle, .. }
            | Event::OfferProcessed { handle, .. }
            | Event::AnswerProcessed { handle, .. }
            | Event::LocalCandidate { handle, .. }
            | Event::CandidateAdded { handle, .. }
            | Event::LocalStreamsUpdated { handle, .. }
                if !self.current_peer(handle) =>
            {
                debug!("ignoring event for stale {}", handle);
            }
            event @ (Event::PeerReady { .. }
            | Event::OfferGenerated { .. }
            | Event::OfferProcessed { .. }
            | Event::AnswerProcessed { .. }
            | Event::LocalCandidate { .. }
            | Event::CandidateAdded { .. }
            | Event::LocalStreamsUpdated { .. }) => self.on_peer_event(event),
            other => return Err(Error::invalid(other.name(), self.state)),
        }
        Ok(())
    }

    fn poll_command(&mut self) -> Option<Command> {
        self.context.poll_command()
    }

    fn affordances(&self) -> Affordances {
        match (self.state, self.is_presenter()) {
            (StreamState::CanStart, _) => Affordances::from([Control::Start, Control::Simulcast]),
            (StreamState::Starting, _) => Affordances::none(),
            (StreamState::CanStop, true) => Affordances::from([Control::Stop, Control::AddStream]),
            (StreamState::CanStop | StreamState::StreamsAdded, false) => {
                Affordances::from([Control::Stop])
            }
            (StreamState::StreamsAdded, true) => Affordances::from([
                Control::Stop,
                Control::AddStream,
                Control::RemoveStream,
            ]),
        }
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

    fn drain(session: &mut MultiStreamSession) -> Vec<Command> {
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

    fn respond(session: &mut MultiStreamSession, id: RequestId, result: Value) {
        session
            .handle_event(Event::Response {
                id,
                outcome: Ok(result),
            })
            .unwrap();
    }

    fn register(session: &mut MultiStreamSession, role: &str) {
        session.handle_event(Event::Start).unwrap();
        let (id, _) = last_sent(&drain(session));
        respond(session, id, json!({ "type": role }));
    }

    /// Presenter with its first stream negotiated.
    fn presenting() -> (MultiStreamSession, PeerHandle) {
        let mut session = MultiStreamSession::new();
        register(&mut session, "presenter");
        assert_eq!(drain(&mut session), vec![Command::AcquireMedia]);

        session.handle_event(Event::MediaAcquired(Ok(()))).unwrap();
        let handle = match drain(&mut session).as_slice() {
            [Command::CreatePeer { handle, spec }] => {
                assert_eq!(spec.mode, PeerMode::SendOnly);
                assert!(spec.multistream);
                *handle
            }
            other => panic!("unexpected commands {other:?}"),
        };

        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        assert_eq!(drain(&mut session), vec![Command::AddLocalStream(handle)]);
        streams_updated(&mut session, handle);
        negotiate(&mut session, handle);
        (session, handle)
    }

    /// The adapter attached or detached a stream; an offer follows.
    fn streams_updated(session: &mut MultiStreamSession, handle: PeerHandle) {
        session
            .handle_event(Event::LocalStreamsUpdated {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        assert_eq!(drain(session), vec![Command::GenerateOffer(handle)]);
    }

    /// Presenter with a second stream negotiated.
    fn with_extra_stream() -> (MultiStreamSession, PeerHandle) {
        let (mut session, handle) = presenting();
        session.handle_event(Event::AddStream).unwrap();
        session.handle_event(Event::MediaAcquired(Ok(()))).unwrap();
        assert_eq!(drain(&mut session), vec![Command::AddLocalStream(handle)]);
        streams_updated(&mut session, handle);
        negotiate(&mut session, handle);
        (session, handle)
    }

    fn negotiate(session: &mut MultiStreamSession, handle: PeerHandle) {
        session
            .handle_event(Event::OfferGenerated {
                handle,
                outcome: Ok("offer".to_owned()),
            })
            .unwrap();
        let (id, request) = last_sent(&drain(session));
        assert_eq!(
            request,
            Request::NegotiateWebRtc(NegotiateParams {
                user_id: None,
                sdp_offer: Some("offer".to_owned())
            })
        );
        respond(session, id, json!({ "sdpAnswer": "answer" }));
        assert_eq!(
            drain(session),
            vec![Command::ProcessAnswer {
                handle,
                sdp: "answer".to_owned()
            }]
        );
    }

    #[test]
    fn presenter_with_one_stream_can_stop() {
        let (session, _) = presenting();
        assert_eq!(session.state(), StreamState::CanStop);
        assert_eq!(session.local_streams(), 1);
        assert_eq!(
            session.affordances(),
            Affordances::from([Control::Stop, Control::AddStream])
        );
    }

    #[test]
    fn added_stream_renegotiates_into_streams_added() {
        let (mut session, handle) = presenting();
        session.handle_event(Event::AddStream).unwrap();
        assert_eq!(session.state(), StreamState::Starting);
        assert_eq!(drain(&mut session), vec![Command::AcquireMedia]);

        session.handle_event(Event::MediaAcquired(Ok(()))).unwrap();
        assert_eq!(drain(&mut session), vec![Command::AddLocalStream(handle)]);
        streams_updated(&mut session, handle);
        negotiate(&mut session, handle);
        assert_eq!(session.state(), StreamState::StreamsAdded);
        assert!(session.affordances().is_enabled(Control::RemoveStream));
    }

    #[test]
    fn removing_the_extra_stream_returns_to_can_stop() {
        let (mut session, handle) = with_extra_stream();

        session.handle_event(Event::RemoveStream).unwrap();
        assert_eq!(drain(&mut session), vec![Command::RemoveLocalStream(handle)]);
        streams_updated(&mut session, handle);
        negotiate(&mut session, handle);
        assert_eq!(session.state(), StreamState::CanStop);
        assert_eq!(session.local_streams(), 1);
        assert!(session.handle_event(Event::RemoveStream).is_err());
    }

    #[test]
    fn denied_camera_returns_to_idle() {
        let mut session = MultiStreamSession::new();
        register(&mut session, "presenter");
        drain(&mut session);
        session
            .handle_event(Event::MediaAcquired(Err(Error::MediaDenied(
                "NotAllowedError".to_owned(),
            ))))
            .unwrap();
        assert_eq!(session.state(), StreamState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![Command::ReleaseMedia, Command::HideSpinner]
        );
    }

    #[test]
    fn denied_extra_camera_disposes_the_peer() {
        let (mut session, handle) = presenting();
        session.handle_event(Event::AddStream).unwrap();
        drain(&mut session);
        session
            .handle_event(Event::MediaAcquired(Err(Error::MediaDenied(
                "NotAllowedError".to_owned(),
            ))))
            .unwrap();
        assert_eq!(session.state(), StreamState::CanStart);
        assert_eq!(
            drain(&mut session),
            vec![
                Command::DisposePeer(handle),
                Command::ReleaseMedia,
                Command::HideSpinner
            ]
        );
    }

    #[test]
    fn viewer_answers_pushed_renegotiation() {
        let mut session = MultiStreamSession::new();
        register(&mut session, "viewer");
        let handle = match drain(&mut session).as_slice() {
            [Command::CreatePeer { handle, spec }] => {
                assert_eq!(spec.mode, PeerMode::RecvOnly);
                *handle
            }
            other => panic!("unexpected commands {other:?}"),
        };
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        let (id, request) = last_sent(&drain(&mut session));
        assert_eq!(request, Request::NegotiateWebRtc(NegotiateParams::default()));
        respond(&mut session, id, json!({ "sdpOffer": "offer 1" }));
        assert_eq!(session.state(), StreamState::CanStop);
        assert_eq!(session.affordances(), Affordances::from([Control::Stop]));
        drain(&mut session);

        session
            .handle_event(Event::Notification(Notification::ViewerNegotiation {
                sdp_offer: "offer 2".to_owned(),
            }))
            .unwrap();
        assert_eq!(
            drain(&mut session),
            vec![Command::ProcessOffer {
                handle,
                sdp: "offer 2".to_owned()
            }]
        );
        session
            .handle_event(Event::OfferProcessed {
                handle,
                outcome: Ok("answer 2".to_owned()),
            })
            .unwrap();
        assert_eq!(
            last_sent(&drain(&mut session)).1,
            Request::ProcessAnswer(ProcessAnswerParams {
                sdp_answer: "answer 2".to_owned(),
                user_id: None
            })
        );
        assert!(session.handle_event(Event::AddStream).is_err());
    }

    #[test]
    fn stop_from_streams_added_disposes_once() {
        let (mut session, handle) = with_extra_stream();

        session.handle_event(Event::Stop).unwrap();
        let commands = drain(&mut session);
        assert_eq!(commands[0], Command::DisposePeer(handle));
        assert!(commands.contains(&Command::ReleaseMedia));
        assert_eq!(last_sent(&commands).1, Request::Stop(Empty {}));
        assert_eq!(session.state(), StreamState::CanStart);
        assert_eq!(session.local_streams(), 0);
    }

    #[test]
    fn failed_attach_returns_to_idle_without_offer() {
        let mut session = MultiStreamSession::new();
        register(&mut session, "presenter");
        drain(&mut session);
        session.handle_event(Event::MediaAcquired(Ok(()))).unwrap();
        let handle = match drain(&mut session).as_slice() {
            [Command::CreatePeer { handle, .. }] => *handle,
            other => panic!("unexpected commands {other:?}"),
        };
        session
            .handle_event(Event::PeerReady {
                handle,
                outcome: Ok(()),
            })
            .unwrap();
        assert_eq!(drain(&mut session), vec![Command::AddLocalStream(handle)]);

        session
            .handle_event(Event::LocalStreamsUpdated {
                handle,
                outcome: Err(Error::Negotiation("no captured stream".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), StreamState::CanStart);
        assert_eq!(session.local_streams(), 0);
        assert_eq!(
            drain(&mut session),
            vec![
                Command::DisposePeer(handle),
                Command::ReleaseMedia,
                Command::HideSpinner
            ]
        );
    }

    #[test]
    fn failed_detach_returns_to_idle() {
        let (mut session, handle) = with_extra_stream();
        session.handle_event(Event::RemoveStream).unwrap();
        drain(&mut session);
        session
            .handle_event(Event::LocalStreamsUpdated {
                handle,
                outcome: Err(Error::Negotiation("nothing to remove".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), StreamState::CanStart);
        let commands = drain(&mut session);
        assert!(commands.contains(&Command::DisposePeer(handle)));
        assert!(!commands.contains(&Command::GenerateOffer(handle)));
    }

    #[test]
    fn capture_finishing_after_failure_is_released() {
        let (mut session, handle) = presenting();
        session.handle_event(Event::AddStream).unwrap();
        drain(&mut session);
        session
            .handle_event(Event::CandidateAdded {
                handle,
                outcome: Err(Error::Negotiation("bad candidate".to_owned())),
            })
            .unwrap();
        assert_eq!(session.state(), StreamState::CanStart);
        drain(&mut session);

        session.handle_event(Event::MediaAcquired(Ok(()))).unwrap();
        assert_eq!(drain(&mut session), vec![Command::ReleaseMedia]);
        assert_eq!(session.state(), StreamState::CanStart);
    }
}
