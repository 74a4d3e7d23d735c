/*!
Browser adapter: binds the session machines to kurento-jsonrpc, kurento-utils,
stomp.js and the tutorial pages' DOM.

[`mount`] wires one page. The script libraries are expected to be loaded by
the host document before the wasm module starts.
*/

mod bindings;
pub mod channel;
pub mod dom;
pub mod media;

use std::rc::Rc;

use anyhow::anyhow;
use js_sys::JSON;
use log::{info, warn};
use rtc_tutorials_protocol::MediaProfile;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

use crate::affordance::Control;
use crate::config::{Page, PageConfig, Transport};
use crate::driver::{SessionDriver, SignalingChannel, View};
use crate::session::Event;
use crate::utils::{normalize_file_name, recording_file_name};
use crate::{Error, Result};
use channel::{JsonRpcChannel, StompChannel};
use dom::{DomView, Layout};
use media::{KurentoMedia, VideoSlots};

const NAME_INPUT: &str = "name";
const PEER_INPUT: &str = "peer";
const FILE_NAME_INPUT: &str = "videoFileName";
const FORMAT_SELECT: &str = "selectFormat";

/// Readable text for a thrown JS value.
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    JSON::stringify(value)
        .ok()
        .map(String::from)
        .unwrap_or_else(|| format!("{value:?}"))
}

pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    JSON::parse(&text).map_err(|err| Error::Signaling(describe(&err)))
}

/// `undefined` reads as `null`.
pub(crate) fn from_js(value: &JsValue) -> Result<Value> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = String::from(
        JSON::stringify(value).map_err(|err| Error::Signaling(describe(&err)))?,
    );
    Ok(serde_json::from_str(&text)?)
}

/// Wire `page` into the current document and connect it to its server.
///
/// # Errors
/// Fails outside a browser, or when a script library the page needs is missing.
pub fn mount(page: Page, config: PageConfig) -> anyhow::Result<SessionDriver> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    let host = window
        .location()
        .host()
        .map_err(|err| anyhow!("no location host: {}", describe(&err)))?;
    let uri = config.signaling.uri_for(page, &host);
    info!("mounting {} against {}", page, uri);

    let view = Rc::new(DomView::new(Layout::for_page(page))?);
    let channel: Rc<dyn SignalingChannel> = match page.transport() {
        Transport::JsonRpc => Rc::new(JsonRpcChannel::connect(&uri, &config.signaling)?),
        Transport::Stomp => Rc::new(StompChannel::connect(&uri)?),
    };
    let slots: Rc<dyn VideoSlots> = Rc::clone(&view);
    let media = Rc::new(KurentoMedia::new(config.media, slots));
    let page_view: Rc<dyn View> = Rc::clone(&view);
    let driver = SessionDriver::new(page.session(), channel, media, page_view);
    view.attach(driver.events());

    for &control in driver.controls() {
        wire_control(&view, &driver, control)?;
    }
    if driver.controls().contains(&Control::StartRecording) {
        wire_recording_name(&view)?;
    }
    listen(&window, "beforeunload", {
        let driver = driver.clone();
        move |_| driver.unload()
    })?;
    Ok(driver)
}

fn listen(
    target: &web_sys::EventTarget,
    kind: &str,
    handler: impl FnMut(web_sys::Event) + 'static,
) -> anyhow::Result<()> {
    let handler = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);
    target
        .add_event_listener_with_callback(kind, handler.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("failed to listen for {}: {}", kind, describe(&err)))?;
    handler.forget();
    Ok(())
}

/// Event a click on `control` stands for, read from the page's inputs.
fn event_for(view: &DomView, control: Control) -> Option<Event> {
    let value = |id: &str| view.input(id).map(|input| input.value()).unwrap_or_default();
    let event = match control {
        Control::Start => Event::Start,
        Control::Stop | Control::Terminate => Event::Stop,
        Control::Register => Event::Register {
            name: value(NAME_INPUT),
        },
        Control::Call => Event::Call {
            to: value(PEER_INPUT),
        },
        Control::Simulcast => Event::SetSimulcast(
            view.input(Control::Simulcast.element_id())
                .is_some_and(|checkbox| checkbox.checked()),
        ),
        Control::AddStream => Event::AddStream,
        Control::RemoveStream => Event::RemoveStream,
        Control::AddViewer => Event::AddViewer,
        Control::StartRecording => {
            let profile = selected_profile(view);
            let path = normalize_file_name(&value(FILE_NAME_INPUT), profile)?;
            Event::StartRecording { path, profile }
        }
        Control::StopRecording => Event::StopRecording,
        Control::Play => return None,
    };
    Some(event)
}

fn selected_profile(view: &DomView) -> MediaProfile {
    view.select(FORMAT_SELECT)
        .and_then(|select| select.value().parse().ok())
        .unwrap_or_default()
}

fn wire_control(
    view: &Rc<DomView>,
    driver: &SessionDriver,
    control: Control,
) -> anyhow::Result<()> {
    let Some(element) = view.element(control.element_id()) else {
        warn!("page has no #{}", control.element_id());
        return Ok(());
    };
    let kind = if control == Control::Simulcast {
        "change"
    } else {
        "click"
    };
    let view = Rc::clone(view);
    let driver = driver.clone();
    listen(&element, kind, move |ev| {
        if kind == "click" {
            ev.prevent_default();
        }
        let Some(event) = event_for(&view, control) else {
            return;
        };
        if let Err(err) = driver.dispatch(event) {
            warn!("{}", err);
        }
    })
}

/// Keep the recording file name's extension in line with the selected format.
fn wire_recording_name(view: &Rc<DomView>) -> anyhow::Result<()> {
    let (Some(input), Some(select)) = (view.input(FILE_NAME_INPUT), view.select(FORMAT_SELECT))
    else {
        warn!("page has no recording file name inputs");
        return Ok(());
    };
    input.set_value(&recording_file_name(&input.value(), selected_profile(view)));

    listen(&select, "change", {
        let view = Rc::clone(view);
        let input = input.clone();
        move |_| {
            let profile = selected_profile(&view);
            input.set_value(&recording_file_name(&input.value(), profile));
        }
    })?;
    let target = input.clone();
    listen(&target, "change", {
        let view = Rc::clone(view);
        move |_| {
            if let Some(name) = normalize_file_name(&input.value(), selected_profile(&view)) {
                input.set_value(&name);
            }
        }
    })
}
