/*!
Glue between a session machine and the outside world.

[`SessionDriver`] feeds a [`Session`] with events and carries out the
commands it emits using three collaborators: a [`SignalingChannel`], a
[`MediaBackend`] wrapping the peer connections, and a [`View`] for the page.
Collaborators report asynchronous outcomes through an [`EventSink`].

Everything runs on the browser's single thread. Outcomes reported while the
driver is busy, including synchronous callbacks, are queued and handled in
arrival order once the current event is done.
*/

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use log::{debug, error, info, warn};
use rtc_tutorials_protocol::request::Request;
use rtc_tutorials_protocol::response::CallReply;
use rtc_tutorials_protocol::IceCandidate;
use serde_json::Value;

use crate::affordance::{Affordances, Control};
use crate::session::{Command, Event, IncomingCallId, PeerHandle, PeerSpec, Session};
use crate::{Error, Result};

/// Outbound side of a signaling transport.
pub trait SignalingChannel {
    /// Where to deliver notifications and incoming calls.
    fn subscribe(&self, events: EventSink);

    /// Send one call. `on_response` runs once, with the result or the failure.
    fn send(&self, request: &Request, on_response: Box<dyn FnOnce(Result<Value>)>);

    fn reply_incoming_call(&self, call: IncomingCallId, reply: &CallReply);

    fn close(&self);
}

/// Peer connection wrappers and local capture.
///
/// Every operation reports its outcome as an [`Event`] through `events`.
pub trait MediaBackend {
    fn create_peer(&self, handle: PeerHandle, spec: &PeerSpec, events: EventSink);
    fn generate_offer(&self, handle: PeerHandle, events: EventSink);
    fn process_offer(&self, handle: PeerHandle, sdp: &str, events: EventSink);
    fn process_answer(&self, handle: PeerHandle, sdp: &str, events: EventSink);
    fn add_ice_candidate(&self, handle: PeerHandle, candidate: &IceCandidate, events: EventSink);
    fn acquire_media(&self, events: EventSink);

    /// # Errors
    /// Fails if there is no captured stream or no such peer.
    fn add_local_stream(&self, handle: PeerHandle) -> Result<()>;

    /// # Errors
    /// Fails if the peer has no stream to remove.
    fn remove_local_stream(&self, handle: PeerHandle) -> Result<()>;

    /// Stop acquired streams that were never attached.
    fn release_media(&self);

    fn dispose(&self, handle: PeerHandle);
}

/// The page the user interacts with.
pub trait View {
    /// Enable exactly the controls in `enabled`, disable the other `controls`.
    fn render(&self, controls: &[Control], enabled: &Affordances);
    fn alert(&self, message: &str);
    fn confirm(&self, message: &str) -> bool;
    fn show_spinner(&self);
    fn hide_spinner(&self);
}

struct DriverInner {
    session: RefCell<Box<dyn Session>>,
    queue: RefCell<VecDeque<Event>>,
    pumping: Cell<bool>,
    channel: Rc<dyn SignalingChannel>,
    media: Rc<dyn MediaBackend>,
    view: Rc<dyn View>,
}

/// Handle for reporting outcomes back to a driver.
///
/// Holds the driver weakly: events sent after the page is torn down are dropped.
#[derive(Clone)]
pub struct EventSink {
    driver: Weak<DriverInner>,
}

impl EventSink {
    pub fn emit(&self, event: Event) {
        match self.driver.upgrade() {
            Some(inner) => {
                if let Err(err) = (SessionDriver { inner }).dispatch(event) {
                    warn!("{}", err);
                }
            }
            None => debug!("driver gone, dropping {}", event.name()),
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("alive", &(self.driver.strong_count() > 0))
            .finish()
    }
}

/// Runs one page's session machine. Cheap to clone.
#[derive(Clone)]
pub struct SessionDriver {
    inner: Rc<DriverInner>,
}

impl SessionDriver {
    pub fn new(
        session: Box<dyn Session>,
        channel: Rc<dyn SignalingChannel>,
        media: Rc<dyn MediaBackend>,
        view: Rc<dyn View>,
    ) -> Self {
        let driver = Self {
            inner: Rc::new(DriverInner {
                session: RefCell::new(session),
                queue: RefCell::new(VecDeque::new()),
                pumping: Cell::new(false),
                channel,
                media,
                view,
            }),
        };
        driver.inner.channel.subscribe(driver.events());
        driver.render();
        driver
    }

    #[must_use]
    pub fn events(&self) -> EventSink {
        EventSink {
            driver: Rc::downgrade(&self.inner),
        }
    }

    /// Controls the page's session gates.
    #[must_use]
    pub fn controls(&self) -> &'static [Control] {
        self.inner.session.borrow().controls()
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        self.inner.session.borrow().affordances()
    }

    /// Handle one event and everything it triggers.
    ///
    /// # Errors
    /// Returns the rejection if `event` is a user action not valid in the
    /// current state. Events arriving while another one is being handled are
    /// queued, and their rejections only logged.
    pub fn dispatch(&self, event: Event) -> Result<()> {
        if self.inner.pumping.get() {
            self.inner.queue.borrow_mut().push_back(event);
            return Ok(());
        }
        self.inner.pumping.set(true);
        let result = self.step(event);
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(next) = next else { break };
            if let Err(err) = self.step(next) {
                warn!("{}", err);
            }
        }
        self.inner.pumping.set(false);
        self.render();
        result
    }

    /// Page is going away: stop whatever runs and close the transport.
    pub fn unload(&self) {
        info!("page unloading");
        match self.dispatch(Event::Stop) {
            Ok(()) | Err(Error::InvalidAction { .. }) => {}
            Err(err) => error!("stop on unload failed: {}", err),
        }
        self.inner.channel.close();
    }

    fn step(&self, event: Event) -> Result<()> {
        debug!("handling {}", event.name());
        let result = self.inner.session.borrow_mut().handle_event(event);
        loop {
            let command = self.inner.session.borrow_mut().poll_command();
            let Some(command) = command else { break };
            self.execute(command);
        }
        result
    }

    fn render(&self) {
        let session = self.inner.session.borrow();
        self.inner
            .view
            .render(session.controls(), &session.affordances());
    }

    fn execute(&self, command: Command) {
        let inner = &self.inner;
        match command {
            Command::Send { id, request } => {
                let events = self.events();
                inner.channel.send(
                    &request,
                    Box::new(move |outcome| events.emit(Event::Response { id, outcome })),
                );
            }
            Command::CreatePeer { handle, spec } => {
                inner.media.create_peer(handle, &spec, self.events());
            }
            Command::GenerateOffer(handle) => inner.media.generate_offer(handle, self.events()),
            Command::ProcessOffer { handle, sdp } => {
                inner.media.process_offer(handle, &sdp, self.events());
            }
            Command::ProcessAnswer { handle, sdp } => {
                inner.media.process_answer(handle, &sdp, self.events());
            }
            Command::AddIceCandidate { handle, candidate } => {
                inner
                    .media
                    .add_ice_candidate(handle, &candidate, self.events());
            }
            Command::AcquireMedia => inner.media.acquire_media(self.events()),
            Command::AddLocalStream(handle) => {
                let outcome = inner.media.add_local_stream(handle);
                if let Err(ref err) = outcome {
                    error!("failed to attach local stream to {}: {}", handle, err);
                }
                inner
                    .queue
                    .borrow_mut()
                    .push_back(Event::LocalStreamsUpdated { handle, outcome });
            }
            Command::RemoveLocalStream(handle) => {
                let outcome = inner.media.remove_local_stream(handle);
                if let Err(ref err) = outcome {
                    error!("failed to detach local stream from {}: {}", handle, err);
                }
                inner
                    .queue
                    .borrow_mut()
                    .push_back(Event::LocalStreamsUpdated { handle, outcome });
            }
            Command::ReleaseMedia => inner.media.release_media(),
            Command::DisposePeer(handle) => inner.media.dispose(handle),
            Command::ConfirmIncomingCall { call, caller } => {
                let accept = inner
                    .view
                    .confirm(&format!("Incoming call from {caller}. Accept?"));
                inner
                    .queue
                    .borrow_mut()
                    .push_back(Event::IncomingCallDecision { call, accept });
            }
            Command::ReplyIncomingCall { call, reply } => {
                inner.channel.reply_incoming_call(call, &reply);
            }
            Command::Alert(message) => inner.view.alert(&message),
            Command::ShowSpinner => inner.view.show_spinner(),
            Command::HideSpinner => inner.view.hide_spinner(),
        }
    }
}
