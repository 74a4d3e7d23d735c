use std::collections::{BTreeMap, HashMap, VecDeque};

use log::{debug, error};
use rtc_tutorials_protocol::request::Request;
use rtc_tutorials_protocol::UserId;
use serde_json::Value;

use crate::session::{Command, PeerHandle, PeerSpec, RequestId};
use crate::{Error, Result};

#[derive(Debug)]
enum Pending<P> {
    /// The machine waits for this response to make progress.
    Step(P),
    /// Nothing waits for the result, but a failure ends the session.
    Ack {
        method: &'static str,
        user: Option<UserId>,
    },
    /// Sent on the way back to idle; failures are only logged.
    Teardown(&'static str),
}

/// What a response means to the machine that sent the request.
#[derive(Debug)]
pub enum Resolved<P> {
    /// A step the machine was waiting for.
    Step(P, Result<Value>),
    /// An acknowledged call failed; the machine must go back to idle.
    Failed(Error),
    /// Nothing left to do.
    Settled,
}

/// Per-page bookkeeping owned by a session machine.
///
/// Tracks which outbound calls are still awaited, which peer connection
/// wrappers are alive, and queues the commands produced while handling an event.
#[derive(Debug)]
pub struct SessionContext<P> {
    next_request: u64,
    next_peer: u64,
    pending: HashMap<RequestId, Pending<P>>,
    peers: BTreeMap<PeerHandle, PeerSpec>,
    commands: VecDeque<Command>,
}

impl<P> Default for SessionContext<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> SessionContext<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_request: 1,
            next_peer: 1,
            pending: HashMap::new(),
            peers: BTreeMap::new(),
            commands: VecDeque::new(),
        }
    }

    /// Send a call whose result drives the machine forward.
    pub fn request(&mut self, request: Request, step: P) -> RequestId {
        self.send(request, Pending::Step(step))
    }

    /// Send a call nothing waits for. Stop requests only log their failures,
    /// any other failure is handed back by [`Self::resolve`].
    pub fn notify(&mut self, request: Request) -> RequestId {
        let method = request.method();
        let pending = if request.is_stop() {
            Pending::Teardown(method)
        } else {
            Pending::Ack {
                method,
                user: request.user_id().cloned(),
            }
        };
        self.send(request, pending)
    }

    fn send(&mut self, request: Request, pending: Pending<P>) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        debug!("sending {} as {}", request.method(), id);
        self.pending.insert(id, pending);
        self.commands.push_back(Command::Send { id, request });
        id
    }

    /// Match a response with the step that awaited it.
    ///
    /// Responses nobody waits for any more, e.g. because the session was
    /// stopped in the meantime, are settled without effect.
    pub fn resolve(&mut self, id: RequestId, outcome: Result<Value>) -> Resolved<P> {
        match self.pending.remove(&id) {
            Some(Pending::Step(step)) => Resolved::Step(step, outcome),
            Some(Pending::Ack { method, .. }) => match outcome {
                Ok(_) => Resolved::Settled,
                Err(err) => {
                    error!("{} ({}) failed: {}", method, id, err);
                    Resolved::Failed(err)
                }
            },
            Some(Pending::Teardown(method)) => {
                if let Err(err) = outcome {
                    error!("{} ({}) failed: {}", method, id, err);
                }
                Resolved::Settled
            }
            None => {
                debug!("ignoring response to {}, it is no longer awaited", id);
                Resolved::Settled
            }
        }
    }

    /// Stop awaiting every step for which `keep` returns `false`.
    pub fn retain_steps(&mut self, mut keep: impl FnMut(&P) -> bool) {
        self.pending.retain(|_, pending| match *pending {
            Pending::Step(ref step) => keep(step),
            Pending::Ack { .. } | Pending::Teardown(_) => true,
        });
    }

    /// Ignore the outcome of every outstanding acknowledgement.
    pub fn forget_acks(&mut self) {
        self.pending
            .retain(|_, pending| !matches!(pending, Pending::Ack { .. }));
    }

    /// Ignore the outcome of outstanding acknowledgements about `user`.
    pub fn forget_acks_of(&mut self, user: &UserId) {
        self.pending.retain(|_, pending| match *pending {
            Pending::Ack {
                user: Some(ref owner),
                ..
            } => owner != user,
            _ => true,
        });
    }

    /// Stop awaiting anything but teardown calls.
    pub fn clear_pending(&mut self) {
        self.pending
            .retain(|_, pending| matches!(pending, Pending::Teardown(_)));
    }

    /// Number of steps still awaited.
    #[must_use]
    pub fn awaited_steps(&self) -> usize {
        self.pending
            .values()
            .filter(|pending| matches!(pending, Pending::Step(_)))
            .count()
    }

    pub fn create_peer(&mut self, spec: PeerSpec) -> PeerHandle {
        let handle = PeerHandle(self.next_peer);
        self.next_peer += 1;
        debug!("creating {} ({:?})", handle, spec.mode);
        self.commands.push_back(Command::CreatePeer {
            handle,
            spec: spec.clone(),
        });
        self.peers.insert(handle, spec);
        handle
    }

    /// Dispose a live peer. Disposing twice, or a peer never created, is a no-op.
    pub fn dispose_peer(&mut self, handle: PeerHandle) -> bool {
        if self.peers.remove(&handle).is_some() {
            debug!("disposing {}", handle);
            self.commands.push_back(Command::DisposePeer(handle));
            true
        } else {
            false
        }
    }

    pub fn dispose_all(&mut self) {
        let handles: Vec<PeerHandle> = self.peers.keys().copied().collect();
        for handle in handles {
            self.dispose_peer(handle);
        }
    }

    /// Back to idle: dispose every peer and stop awaiting every step and ack.
    pub fn reset(&mut self) {
        self.dispose_all();
        self.clear_pending();
    }

    #[must_use]
    pub fn is_live(&self, handle: PeerHandle) -> bool {
        self.peers.contains_key(&handle)
    }

    #[must_use]
    pub fn peer(&self, handle: PeerHandle) -> Option<&PeerSpec> {
        self.peers.get(&handle)
    }

    #[must_use]
    pub fn live_peers(&self) -> usize {
        self.peers.len()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    pub fn poll_command(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }
}

#[cfg(test)]
mod test {
    use rtc_tutorials_protocol::request::{Empty, IceCandidateParams, UserParams};
    use rtc_tutorials_protocol::IceCandidate;

    use super::*;
    use crate::session::PeerMode;

    fn candidate() -> Request {
        Request::IceCandidate(IceCandidateParams {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 9 typ host".to_owned(),
                sdp_mid: None,
                sdp_m_line_index: None,
            },
            user_id: None,
        })
    }

    #[test]
    fn dispose_is_emitted_once_per_peer() {
        let mut context = SessionContext::<()>::new();
        let handle = context.create_peer(PeerSpec::new(PeerMode::SendRecv));
        assert!(context.dispose_peer(handle));
        assert!(!context.dispose_peer(handle));
        context.dispose_all();

        let commands: Vec<Command> = std::iter::from_fn(|| context.poll_command()).collect();
        let disposals = commands
            .iter()
            .filter(|command| matches!(command, Command::DisposePeer(_)))
            .count();
        assert_eq!(disposals, 1);
    }

    #[test]
    fn reset_forgets_steps_and_acks_but_keeps_teardown() {
        let mut context = SessionContext::new();
        let step = context.request(Request::StartMediaSession(Empty {}), "start");
        let ack = context.notify(candidate());
        let teardown = context.notify(Request::StopMediaSession(Empty {}));
        context.reset();

        assert!(matches!(
            context.resolve(step, Ok(Value::Null)),
            Resolved::Settled
        ));
        assert!(matches!(
            context.resolve(ack, Err(Error::Signaling("late".to_owned()))),
            Resolved::Settled
        ));
        assert!(matches!(
            context.resolve(teardown, Err(Error::Signaling("closed".to_owned()))),
            Resolved::Settled
        ));
        assert_eq!(context.awaited_steps(), 0);
    }

    #[test]
    fn acks_of_a_stopped_user_are_forgotten() {
        let mut context = SessionContext::<()>::new();
        let viewer = UserId::from("viewer0");
        let theirs = context.notify(Request::SwitchQuality(UserParams {
            user_id: viewer.clone(),
        }));
        let ours = context.notify(candidate());
        context.forget_acks_of(&viewer);

        assert!(matches!(
            context.resolve(theirs, Err(Error::Signaling("gone".to_owned()))),
            Resolved::Settled
        ));
        assert!(matches!(
            context.resolve(ours, Err(Error::Signaling("boom".to_owned()))),
            Resolved::Failed(_)
        ));
    }

    #[test]
    fn failed_ack_is_handed_back() {
        let mut context = SessionContext::<()>::new();
        let ack = context.notify(candidate());
        assert!(matches!(
            context.resolve(ack, Err(Error::Signaling("boom".to_owned()))),
            Resolved::Failed(Error::Signaling(_))
        ));
    }

    #[test]
    fn steps_resolve_exactly_once() {
        let mut context = SessionContext::new();
        let id = context.request(Request::RegisterClient(Empty {}), 7_u8);
        let Resolved::Step(step, outcome) = context.resolve(id, Ok(Value::Null)) else {
            panic!("step not resolved");
        };
        assert_eq!(step, 7);
        assert!(outcome.is_ok());
        assert!(matches!(
            context.resolve(id, Ok(Value::Null)),
            Resolved::Settled
        ));
    }

    #[test]
    fn request_ids_and_handles_are_not_reused() {
        let mut context = SessionContext::<()>::new();
        let first = context.create_peer(PeerSpec::new(PeerMode::RecvOnly));
        context.dispose_peer(first);
        let second = context.create_peer(PeerSpec::new(PeerMode::RecvOnly));
        assert_ne!(first, second);

        let a = context.notify(Request::Stop(Empty {}));
        let b = context.notify(Request::Stop(Empty {}));
        assert_ne!(a, b);
    }
}
