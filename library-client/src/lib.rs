//! Entry points the tutorial pages call once their script libraries are loaded.
//!
//! Each takes an optional configuration object, for example
//! `{ signaling: { uri: "wss://host/one2one" }, media: { audio: false } }`.

#![cfg(target_arch = "wasm32")]

use anyhow::anyhow;
use log::{error, info};
use rtc_tutorials::web::mount;
use rtc_tutorials::{set_panic_hook, Page, PageConfig};
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsValue;

#[wasm_bindgen(start)]
pub fn main() {
    set_panic_hook();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Debug));
    info!("tutorial pages module loaded");
}

fn page_config(config: &JsValue) -> anyhow::Result<PageConfig> {
    if config.is_undefined() || config.is_null() {
        return Ok(PageConfig::default());
    }
    let text = js_sys::JSON::stringify(config)
        .map_err(|err| anyhow!("config is not serializable: {:?}", err))?;
    Ok(serde_json::from_str(&String::from(text))?)
}

fn start(page: Page, config: &JsValue) -> Result<(), JsValue> {
    let mounted = page_config(config).and_then(|config| mount(page, config));
    match mounted {
        Ok(_driver) => {
            info!("{} page ready", page);
            Ok(())
        }
        Err(err) => {
            error!("failed to start {} page: {:#}", page, err);
            Err(JsValue::from_str(&err.to_string()))
        }
    }
}

#[wasm_bindgen]
pub fn loopback(config: JsValue) -> Result<(), JsValue> {
    start(Page::Loopback, &config)
}

/// Loopback over STOMP, against the Spring messaging backend.
#[wasm_bindgen(js_name = loopbackStomp)]
pub fn loopback_stomp(config: JsValue) -> Result<(), JsValue> {
    start(Page::LoopbackStomp, &config)
}

#[wasm_bindgen(js_name = one2one)]
pub fn one_to_one(config: JsValue) -> Result<(), JsValue> {
    start(Page::OneToOne, &config)
}

#[wasm_bindgen(js_name = sfuMultiBrowser)]
pub fn sfu_multi_browser(config: JsValue) -> Result<(), JsValue> {
    start(Page::SfuMultiBrowser, &config)
}

#[wasm_bindgen(js_name = sfuMultiSession)]
pub fn sfu_multi_session(config: JsValue) -> Result<(), JsValue> {
    start(Page::SfuMultiSession, &config)
}

#[wasm_bindgen(js_name = peerConnection)]
pub fn peer_connection(config: JsValue) -> Result<(), JsValue> {
    start(Page::MultiStream, &config)
}
