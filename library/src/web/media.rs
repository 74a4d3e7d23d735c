use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Function, Object, Reflect};
use log::{debug, error, info, warn};
use rtc_tutorials_protocol::IceCandidate;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlVideoElement, MediaStream, MediaStreamConstraints, MediaStreamTrack};

use super::bindings::{
    web_rtc_peer2_recvonly, web_rtc_peer2_sendonly, web_rtc_peer_recvonly,
    web_rtc_peer_sendonly, web_rtc_peer_sendrecv, StreamPeerConnection, WebRtcPeer,
};
use super::{describe, from_js, to_js};
use crate::config::MediaConstraints;
use crate::driver::{EventSink, MediaBackend};
use crate::session::{Event, PeerHandle, PeerMode, PeerSpec};
use crate::{Error, Result};

/// Where a peer's local and remote media are shown.
pub trait VideoSlots {
    fn local(&self, spec: &PeerSpec) -> Option<HtmlVideoElement>;
    fn remote(&self, spec: &PeerSpec) -> Option<HtmlVideoElement>;
    /// The peer described by `spec` is gone.
    fn release(&self, spec: &PeerSpec);
}

struct PeerEntry {
    peer: WebRtcPeer,
    spec: PeerSpec,
    /// Streams attached by hand, most recent last.
    attached: Vec<MediaStream>,
}

/// Peers backed by kurento-utils, media captured with `getUserMedia`.
pub struct KurentoMedia {
    constraints: MediaConstraints,
    slots: Rc<dyn VideoSlots>,
    peers: RefCell<HashMap<PeerHandle, PeerEntry>>,
    /// Captured but not yet attached to a peer.
    captured: Rc<RefCell<Vec<MediaStream>>>,
}

impl KurentoMedia {
    pub fn new(constraints: MediaConstraints, slots: Rc<dyn VideoSlots>) -> Self {
        Self {
            constraints,
            slots,
            peers: RefCell::new(HashMap::new()),
            captured: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn peer(&self, handle: PeerHandle) -> Option<WebRtcPeer> {
        self.peers
            .borrow()
            .get(&handle)
            .map(|entry| entry.peer.clone())
    }

    fn options(&self, handle: PeerHandle, spec: &PeerSpec, events: EventSink) -> Result<Object> {
        let options = Object::new();
        let set = |key: &str, value: &JsValue| {
            Reflect::set(&options, &key.into(), value)
                .map(|_| ())
                .map_err(|err| Error::Negotiation(describe(&err)))
        };

        let on_ice_candidate = Closure::wrap(Box::new(move |candidate: JsValue| {
            let candidate = from_js(&candidate)
                .and_then(|candidate| {
                    serde_json::from_value::<IceCandidate>(candidate).map_err(Error::from)
                });
            match candidate {
                Ok(candidate) => events.emit(Event::LocalCandidate { handle, candidate }),
                Err(err) => error!("unreadable local candidate on {}: {}", handle, err),
            }
        }) as Box<dyn FnMut(JsValue)>);
        set("onicecandidate", on_ice_candidate.as_ref())?;
        on_ice_candidate.forget();

        set("mediaConstraints", &to_js(&self.constraints)?)?;
        if spec.simulcast {
            set("simulcast", &JsValue::TRUE)?;
        }
        if spec.multistream {
            set("multistream", &JsValue::TRUE)?;
        }
        if let Some(user_id) = &spec.user_id {
            set("id", &user_id.as_str().into())?;
        }
        // hand-attached streams are shown by `add_local_stream`
        if !spec.multistream {
            if let Some(video) = self.slots.local(spec) {
                set("localVideo", video.as_ref())?;
            }
        }
        if let Some(video) = self.slots.remote(spec) {
            set("remoteVideo", video.as_ref())?;
        }
        Ok(options)
    }

    fn show_local(&self, spec: &PeerSpec, stream: Option<&MediaStream>) {
        if let Some(video) = self.slots.local(spec) {
            video.set_muted(true);
            video.set_src_object(stream);
        }
    }
}

fn connection(peer: &WebRtcPeer) -> Result<StreamPeerConnection> {
    peer.peer_connection()
        .ok_or_else(|| Error::Negotiation("peer has no connection".to_owned()))
}

fn stop_tracks(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        track.unchecked_into::<MediaStreamTrack>().stop();
    }
}

async fn capture(constraints: Result<JsValue>) -> Result<MediaStream> {
    let constraints: MediaStreamConstraints = constraints?.unchecked_into();
    let devices = web_sys::window()
        .ok_or_else(|| Error::MediaDenied("no window".to_owned()))?
        .navigator()
        .media_devices()
        .map_err(|err| Error::MediaDenied(describe(&err)))?;
    let promise = devices
        .get_user_media_with_constraints(&constraints)
        .map_err(|err| Error::MediaDenied(describe(&err)))?;
    let stream = JsFuture::from(promise)
        .await
        .map_err(|err| Error::MediaDenied(describe(&err)))?;
    Ok(stream.unchecked_into())
}

/// `callback(error)` reporting through `report`.
fn unit_callback(report: impl FnOnce(Result<()>) + 'static) -> JsValue {
    Closure::once_into_js(move |error: JsValue| {
        if error.is_null() || error.is_undefined() {
            report(Ok(()));
        } else {
            report(Err(Error::Negotiation(describe(&error))));
        }
    })
}

/// `callback(error, sdp)` reporting through `report`.
fn sdp_callback(report: impl FnOnce(Result<String>) + 'static) -> JsValue {
    Closure::once_into_js(move |error: JsValue, sdp: JsValue| {
        if !(error.is_null() || error.is_undefined()) {
            report(Err(Error::Negotiation(describe(&error))));
        } else if let Some(sdp) = sdp.as_string() {
            report(Ok(sdp));
        } else {
            report(Err(Error::Negotiation("no SDP in callback".to_owned())));
        }
    })
}

impl MediaBackend for KurentoMedia {
    fn create_peer(&self, handle: PeerHandle, spec: &PeerSpec, events: EventSink) {
        info!("creating {:?} peer {}", spec.mode, handle);
        let options = match self.options(handle, spec, events.clone()) {
            Ok(options) => options,
            Err(err) => return events.emit(Event::PeerReady { handle, outcome: Err(err) }),
        };
        let ready = {
            let events = events.clone();
            unit_callback(move |outcome| events.emit(Event::PeerReady { handle, outcome }))
        };
        let ready: &Function = ready.unchecked_ref();
        let peer = match (spec.mode, spec.multistream) {
            (PeerMode::SendRecv, _) => web_rtc_peer_sendrecv(&options, ready),
            (PeerMode::SendOnly, false) => web_rtc_peer_sendonly(&options, ready),
            (PeerMode::RecvOnly, false) => web_rtc_peer_recvonly(&options, ready),
            (PeerMode::SendOnly, true) => web_rtc_peer2_sendonly(&options, ready),
            (PeerMode::RecvOnly, true) => web_rtc_peer2_recvonly(&options, ready),
        };
        match peer {
            Ok(peer) => {
                self.peers.borrow_mut().insert(
                    handle,
                    PeerEntry {
                        peer,
                        spec: spec.clone(),
                        attached: Vec::new(),
                    },
                );
            }
            Err(err) => events.emit(Event::PeerReady {
                handle,
                outcome: Err(Error::Negotiation(describe(&err))),
            }),
        }
    }

    fn generate_offer(&self, handle: PeerHandle, events: EventSink) {
        let Some(peer) = self.peer(handle) else {
            return events.emit(Event::OfferGenerated {
                handle,
                outcome: Err(Error::UnknownPeer(handle)),
            });
        };
        let report = events.clone();
        let callback = sdp_callback(move |outcome| {
            report.emit(Event::OfferGenerated { handle, outcome });
        });
        if let Err(err) = peer.generate_offer(callback.unchecked_ref()) {
            events.emit(Event::OfferGenerated {
                handle,
                outcome: Err(Error::Negotiation(describe(&err))),
            });
        }
    }

    fn process_offer(&self, handle: PeerHandle, sdp: &str, events: EventSink) {
        let Some(peer) = self.peer(handle) else {
            return events.emit(Event::OfferProcessed {
                handle,
                outcome: Err(Error::UnknownPeer(handle)),
            });
        };
        let report = events.clone();
        let callback = sdp_callback(move |outcome| {
            report.emit(Event::OfferProcessed { handle, outcome });
        });
        if let Err(err) = peer.process_offer(sdp, callback.unchecked_ref()) {
            events.emit(Event::OfferProcessed {
                handle,
                outcome: Err(Error::Negotiation(describe(&err))),
            });
        }
    }

    fn process_answer(&self, handle: PeerHandle, sdp: &str, events: EventSink) {
        let Some(peer) = self.peer(handle) else {
            return events.emit(Event::AnswerProcessed {
                handle,
                outcome: Err(Error::UnknownPeer(handle)),
            });
        };
        let report = events.clone();
        let callback = unit_callback(move |outcome| {
            report.emit(Event::AnswerProcessed { handle, outcome });
        });
        if let Err(err) = peer.process_answer(sdp, callback.unchecked_ref()) {
            events.emit(Event::AnswerProcessed {
                handle,
                outcome: Err(Error::Negotiation(describe(&err))),
            });
        }
    }

    fn add_ice_candidate(&self, handle: PeerHandle, candidate: &IceCandidate, events: EventSink) {
        let Some(peer) = self.peer(handle) else {
            return events.emit(Event::CandidateAdded {
                handle,
                outcome: Err(Error::UnknownPeer(handle)),
            });
        };
        let candidate = match to_js(candidate) {
            Ok(candidate) => candidate,
            Err(err) => return events.emit(Event::CandidateAdded { handle, outcome: Err(err) }),
        };
        let report = events.clone();
        let callback = unit_callback(move |outcome| {
            report.emit(Event::CandidateAdded { handle, outcome });
        });
        if let Err(err) = peer.add_ice_candidate(&candidate, callback.unchecked_ref()) {
            events.emit(Event::CandidateAdded {
                handle,
                outcome: Err(Error::Negotiation(describe(&err))),
            });
        }
    }

    fn acquire_media(&self, events: EventSink) {
        let constraints = to_js(&self.constraints);
        let captured = Rc::clone(&self.captured);
        wasm_bindgen_futures::spawn_local(async move {
            let outcome = capture(constraints).await.map(|stream| {
                debug!("captured stream {}", stream.id());
                captured.borrow_mut().push(stream);
            });
            if let Err(err) = &outcome {
                warn!("access denied to camera: {}", err);
            }
            events.emit(Event::MediaAcquired(outcome));
        });
    }

    fn add_local_stream(&self, handle: PeerHandle) -> Result<()> {
        let mut peers = self.peers.borrow_mut();
        let entry = peers.get_mut(&handle).ok_or(Error::UnknownPeer(handle))?;
        let stream = self
            .captured
            .borrow_mut()
            .pop()
            .ok_or_else(|| Error::MediaDenied("no captured stream to attach".to_owned()))?;
        let added = connection(&entry.peer).and_then(|connection| {
            connection
                .add_stream(&stream)
                .map_err(|err| Error::Negotiation(describe(&err)))
        });
        if let Err(err) = added {
            stop_tracks(&stream);
            return Err(err);
        }
        self.show_local(&entry.spec, Some(&stream));
        entry.attached.push(stream);
        Ok(())
    }

    fn remove_local_stream(&self, handle: PeerHandle) -> Result<()> {
        let mut peers = self.peers.borrow_mut();
        let entry = peers.get_mut(&handle).ok_or(Error::UnknownPeer(handle))?;
        let stream = entry
            .attached
            .pop()
            .ok_or_else(|| Error::Negotiation("no attached stream to remove".to_owned()))?;
        let removed = connection(&entry.peer).and_then(|connection| {
            connection
                .remove_stream(&stream)
                .map_err(|err| Error::Negotiation(describe(&err)))
        });
        stop_tracks(&stream);
        self.show_local(&entry.spec, entry.attached.last());
        removed
    }

    fn release_media(&self) {
        let streams = std::mem::take(&mut *self.captured.borrow_mut());
        for stream in &streams {
            debug!("releasing unattached stream {}", stream.id());
            stop_tracks(stream);
        }
    }

    fn dispose(&self, handle: PeerHandle) {
        let entry = self.peers.borrow_mut().remove(&handle);
        let Some(entry) = entry else {
            warn!("dispose of unknown peer {}", handle);
            return;
        };
        info!("disposing peer {}", handle);
        if let Err(err) = entry.peer.dispose() {
            error!("failed to dispose peer {}: {}", handle, describe(&err));
        }
        for stream in &entry.attached {
            stop_tracks(stream);
        }
        if !entry.attached.is_empty() {
            self.show_local(&entry.spec, None);
        }
        self.slots.release(&entry.spec);
    }
}
