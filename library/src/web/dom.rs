use std::cell::RefCell;

use anyhow::anyhow;
use log::{error, warn};
use rtc_tutorials_protocol::UserId;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlInputElement, HtmlSelectElement, HtmlVideoElement, Window};

use super::describe;
use super::media::VideoSlots;
use crate::affordance::{Affordances, Control};
use crate::config::Page;
use crate::constants::{IDLE_POSTER, SPINNER_BACKGROUND, SPINNER_POSTER};
use crate::driver::{EventSink, View};
use crate::session::{Event, PeerSpec};

/// Element ids of the videos a page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub local: &'static str,
    pub remote: &'static str,
    /// Container receiving one row per viewer, on pages that add viewers.
    pub viewers: Option<&'static str>,
}

impl Layout {
    #[must_use]
    pub const fn for_page(page: Page) -> Self {
        match page {
            #[cfg(feature = "loopback")]
            Page::Loopback | Page::LoopbackStomp => Self::split(),
            #[cfg(feature = "one-to-one")]
            Page::OneToOne => Self::split(),
            #[cfg(feature = "one-to-many")]
            Page::SfuMultiSession => Self {
                local: "videoFeed",
                remote: "videoFeed",
                viewers: Some("viewers"),
            },
            #[allow(unreachable_patterns)]
            _ => Self {
                local: "videoFeed",
                remote: "videoFeed",
                viewers: None,
            },
        }
    }

    const fn split() -> Self {
        Self {
            local: "videoInput",
            remote: "videoOutput",
            viewers: None,
        }
    }
}

/// The page's DOM.
pub struct DomView {
    window: Window,
    document: Document,
    layout: Layout,
    events: RefCell<Option<EventSink>>,
}

impl DomView {
    /// # Errors
    /// Fails outside a browser window.
    pub fn new(layout: Layout) -> anyhow::Result<Self> {
        let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
        let document = window.document().ok_or_else(|| anyhow!("no document"))?;
        Ok(Self {
            window,
            document,
            layout,
            events: RefCell::new(None),
        })
    }

    /// Route events raised by viewer rows to `events`.
    pub fn attach(&self, events: EventSink) {
        *self.events.borrow_mut() = Some(events);
    }

    pub fn element(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    pub fn input(&self, id: &str) -> Option<HtmlInputElement> {
        self.element(id)?.dyn_into().ok()
    }

    pub fn select(&self, id: &str) -> Option<HtmlSelectElement> {
        self.element(id)?.dyn_into().ok()
    }

    fn video(&self, id: &str) -> Option<HtmlVideoElement> {
        self.element(id)?.dyn_into().ok()
    }

    fn videos(&self) -> Vec<HtmlVideoElement> {
        let mut ids = vec![self.layout.local];
        if self.layout.remote != self.layout.local {
            ids.push(self.layout.remote);
        }
        ids.into_iter().filter_map(|id| self.video(id)).collect()
    }

    fn is_viewer(&self, spec: &PeerSpec) -> bool {
        self.layout.viewers.is_some()
            && spec
                .user_id
                .as_ref()
                .is_some_and(|user| user.as_str().starts_with("viewer"))
    }

    fn viewer_video(&self, user: &UserId) -> Option<HtmlVideoElement> {
        let video_id = format!("video-{user}");
        if let Some(video) = self.video(&video_id) {
            return Some(video);
        }
        let container = self.element(self.layout.viewers?)?;
        let row = self.document.create_element("div").ok()?;
        row.set_id(user.as_str());
        row.set_class_name("row");
        row.set_inner_html(&format!(
            r##"<div class="col-md-5">
                <h3>Viewer {user}</h3>
                <video id="{video_id}" autoplay width="480px" height="270px" poster="{IDLE_POSTER}"></video>
            </div>
            <div class="col-md-2">
                <a href="#" class="btn btn-danger" id="stop-{user}">
                    <span class="glyphicon glyphicon-stop"></span> Stop </a>
            </div>
            <div class="col-md-3">
                <input type="radio" checked name="quality-{user}" id="high-quality-{user}" value="high"> High quality<br>
                <input type="radio" name="quality-{user}" id="low-quality-{user}" value="low"> Low quality<br>
            </div>"##
        ));
        if let Err(err) = container.append_child(&row) {
            error!("failed to add row for {}: {}", user, describe(&err));
            return None;
        }
        self.on_viewer_click(&format!("stop-{user}"), Event::StopViewer, user);
        self.on_viewer_click(&format!("high-quality-{user}"), Event::SwitchQuality, user);
        self.on_viewer_click(&format!("low-quality-{user}"), Event::SwitchQuality, user);
        self.video(&video_id)
    }

    fn on_viewer_click(&self, id: &str, event: fn(UserId) -> Event, user: &UserId) {
        let (Some(element), Some(events)) = (self.element(id), self.events.borrow().clone()) else {
            warn!("cannot wire {}", id);
            return;
        };
        let user = user.clone();
        let on_click = Closure::wrap(Box::new(move |ev: web_sys::Event| {
            ev.prevent_default();
            events.emit(event(user.clone()));
        }) as Box<dyn FnMut(web_sys::Event)>);
        if let Err(err) =
            element.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
        {
            error!("failed to listen on {}: {}", id, describe(&err));
        }
        on_click.forget();
    }
}

impl View for DomView {
    fn render(&self, controls: &[Control], enabled: &Affordances) {
        for control in controls {
            let Some(element) = self.element(control.element_id()) else {
                continue;
            };
            let disabled = !enabled.is_enabled(*control);
            if let Err(err) = element.toggle_attribute_with_force("disabled", disabled) {
                error!(
                    "failed to toggle {}: {}",
                    control.element_id(),
                    describe(&err)
                );
            }
        }
    }

    fn alert(&self, message: &str) {
        if let Err(err) = self.window.alert_with_message(message) {
            error!("alert failed: {}", describe(&err));
        }
    }

    fn confirm(&self, message: &str) -> bool {
        self.window.confirm_with_message(message).unwrap_or_else(|err| {
            error!("confirm failed: {}", describe(&err));
            false
        })
    }

    fn show_spinner(&self) {
        for video in self.videos() {
            video.set_poster(SPINNER_POSTER);
            if let Err(err) = video.style().set_property("background", SPINNER_BACKGROUND) {
                error!("failed to show spinner: {}", describe(&err));
            }
        }
    }

    fn hide_spinner(&self) {
        for video in self.videos() {
            video.set_src("");
            video.set_src_object(None);
            video.set_poster(IDLE_POSTER);
            if let Err(err) = video.style().set_property("background", "") {
                error!("failed to hide spinner: {}", describe(&err));
            }
        }
    }
}

impl VideoSlots for DomView {
    fn local(&self, spec: &PeerSpec) -> Option<HtmlVideoElement> {
        if self.is_viewer(spec) {
            None
        } else {
            self.video(self.layout.local)
        }
    }

    fn remote(&self, spec: &PeerSpec) -> Option<HtmlVideoElement> {
        match &spec.user_id {
            Some(user) if self.is_viewer(spec) => self.viewer_video(user),
            // the presenter of a multi-session page has no remote view
            Some(_) => None,
            None => self.video(self.layout.remote),
        }
    }

    fn release(&self, spec: &PeerSpec) {
        if let (true, Some(user)) = (self.is_viewer(spec), &spec.user_id) {
            if let Some(row) = self.element(user.as_str()) {
                row.remove();
            }
        }
    }
}
