//! Test suite for the Web and headless browsers.

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use rtc_tutorials::driver::{EventSink, MediaBackend, SessionDriver, SignalingChannel, View};
use rtc_tutorials::loopback::{Flavor, LoopbackSession};
use rtc_tutorials::protocol::request::Request;
use rtc_tutorials::protocol::response::CallReply;
use rtc_tutorials::session::{IncomingCallId, PeerHandle, PeerMode, PeerSpec};
use rtc_tutorials::web::dom::{DomView, Layout};
use rtc_tutorials::web::media::VideoSlots;
use rtc_tutorials::web::mount;
use rtc_tutorials::{Affordances, Control, Event, IceCandidate, Page, PageConfig, UserId};
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{Document, Element, HtmlVideoElement};

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> Document {
    web_sys::window().unwrap().document().unwrap()
}

/// Fresh element with `id` appended to the body, replacing any left by an earlier test.
fn element(tag: &str, id: &str) -> Element {
    let document = document();
    if let Some(old) = document.get_element_by_id(id) {
        old.remove();
    }
    let element = document.create_element(tag).unwrap();
    element.set_id(id);
    document.body().unwrap().append_child(&element).unwrap();
    element
}

#[derive(Default)]
struct RecordingChannel {
    sent: RefCell<Vec<&'static str>>,
}

impl SignalingChannel for RecordingChannel {
    fn subscribe(&self, _: EventSink) {}

    fn send(&self, request: &Request, _: Box<dyn FnOnce(rtc_tutorials::Result<Value>)>) {
        self.sent.borrow_mut().push(request.method());
    }

    fn reply_incoming_call(&self, _: IncomingCallId, _: &CallReply) {}

    fn close(&self) {}
}

struct IdleMedia;

impl MediaBackend for IdleMedia {
    fn create_peer(&self, _: PeerHandle, _: &PeerSpec, _: EventSink) {}
    fn generate_offer(&self, _: PeerHandle, _: EventSink) {}
    fn process_offer(&self, _: PeerHandle, _: &str, _: EventSink) {}
    fn process_answer(&self, _: PeerHandle, _: &str, _: EventSink) {}
    fn add_ice_candidate(&self, _: PeerHandle, _: &IceCandidate, _: EventSink) {}
    fn acquire_media(&self, _: EventSink) {}
    fn add_local_stream(&self, _: PeerHandle) -> rtc_tutorials::Result<()> {
        Ok(())
    }
    fn remove_local_stream(&self, _: PeerHandle) -> rtc_tutorials::Result<()> {
        Ok(())
    }
    fn release_media(&self) {}
    fn dispose(&self, _: PeerHandle) {}
}

#[wasm_bindgen_test]
fn render_disables_controls_outside_affordances() {
    let start = element("button", "start");
    let stop = element("button", "stop");
    let view = DomView::new(Layout::for_page(Page::Loopback)).unwrap();

    view.render(
        &[Control::Start, Control::Stop],
        &Affordances::from([Control::Start]),
    );
    assert!(!start.has_attribute("disabled"));
    assert!(stop.has_attribute("disabled"));

    view.render(
        &[Control::Start, Control::Stop],
        &Affordances::from([Control::Stop]),
    );
    assert!(start.has_attribute("disabled"));
    assert!(!stop.has_attribute("disabled"));
}

#[wasm_bindgen_test]
fn spinner_swaps_posters() {
    let input: HtmlVideoElement = element("video", "videoInput").dyn_into().unwrap();
    let output: HtmlVideoElement = element("video", "videoOutput").dyn_into().unwrap();
    let view = DomView::new(Layout::for_page(Page::OneToOne)).unwrap();

    view.show_spinner();
    assert!(input.poster().ends_with("transparent-1px.png"));
    assert!(output.poster().ends_with("transparent-1px.png"));

    view.hide_spinner();
    assert!(input.poster().ends_with("webrtc.png"));
    assert!(output.poster().ends_with("webrtc.png"));
}

#[wasm_bindgen_test]
fn driver_keeps_page_controls_in_sync() {
    let start = element("button", "start");
    let stop = element("button", "stop");
    element("video", "videoInput");
    element("video", "videoOutput");
    let view = Rc::new(DomView::new(Layout::for_page(Page::Loopback)).unwrap());
    let channel = Rc::new(RecordingChannel::default());

    let driver = SessionDriver::new(
        Box::new(LoopbackSession::new(Flavor::JsonRpc)),
        Rc::clone(&channel) as Rc<dyn SignalingChannel>,
        Rc::new(IdleMedia),
        view,
    );
    assert!(!start.has_attribute("disabled"));
    assert!(stop.has_attribute("disabled"));

    driver.dispatch(Event::Start).unwrap();
    assert_eq!(*channel.sent.borrow(), vec!["registerClient"]);
    assert!(start.has_attribute("disabled"));
    assert!(stop.has_attribute("disabled"));
    assert!(driver.dispatch(Event::Start).is_err());
}

#[wasm_bindgen_test]
fn viewer_rows_follow_their_peers() {
    element("div", "viewers");
    element("video", "videoFeed");
    let view = DomView::new(Layout::for_page(Page::SfuMultiSession)).unwrap();
    let viewer = PeerSpec::new(PeerMode::RecvOnly).user(UserId::from("viewer0"));
    let presenter = PeerSpec::new(PeerMode::SendOnly).user(UserId::from("presenter"));

    assert!(view.remote(&presenter).is_none());
    assert!(view.local(&presenter).is_some());

    let video = view.remote(&viewer).unwrap();
    assert_eq!(video.id(), "video-viewer0");
    assert!(document().get_element_by_id("viewer0").is_some());
    assert!(view.local(&viewer).is_none());

    view.release(&viewer);
    assert!(document().get_element_by_id("viewer0").is_none());
}

#[wasm_bindgen_test]
fn mount_reports_missing_script_libraries() {
    let config: PageConfig = serde_json::from_str(
        r#"{ "signaling": { "uri": "wss://localhost:8443/one2one" } }"#,
    )
    .unwrap();
    assert!(mount(Page::OneToOne, config).is_err());
}
