//! Script-tag libraries the tutorial pages load next to the wasm module.

use js_sys::Function;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsValue;
use web_sys::MediaStream;

#[wasm_bindgen]
extern "C" {
    /// `RpcBuilder.clients.JsonRpcClient` from kurento-jsonrpc.
    #[derive(Debug, Clone)]
    pub type JsonRpcClient;

    #[wasm_bindgen(constructor, catch, js_namespace = ["RpcBuilder", "clients"])]
    pub fn new(config: &JsValue) -> Result<JsonRpcClient, JsValue>;

    /// `callback(error, result)`
    #[wasm_bindgen(method, catch)]
    pub fn send(
        this: &JsonRpcClient,
        method: &str,
        params: &JsValue,
        callback: &Function,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn close(this: &JsonRpcClient) -> Result<(), JsValue>;

    /// Request object handed to server-to-client method handlers.
    #[derive(Debug, Clone)]
    pub type RpcRequest;

    #[wasm_bindgen(method, catch)]
    pub fn reply(this: &RpcRequest, error: &JsValue, result: &JsValue) -> Result<(), JsValue>;
}

#[wasm_bindgen]
extern "C" {
    /// Peer connection wrapper from kurento-utils.
    #[derive(Debug, Clone)]
    pub type WebRtcPeer;

    #[wasm_bindgen(catch, js_namespace = ["kurentoUtils", "WebRtcPeer"], js_name = WebRtcPeerSendrecv)]
    pub fn web_rtc_peer_sendrecv(options: &JsValue, callback: &Function)
        -> Result<WebRtcPeer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["kurentoUtils", "WebRtcPeer"], js_name = WebRtcPeerSendonly)]
    pub fn web_rtc_peer_sendonly(options: &JsValue, callback: &Function)
        -> Result<WebRtcPeer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["kurentoUtils", "WebRtcPeer"], js_name = WebRtcPeerRecvonly)]
    pub fn web_rtc_peer_recvonly(options: &JsValue, callback: &Function)
        -> Result<WebRtcPeer, JsValue>;

    /// Multi-stream capable fork used by the peer connection page.
    #[wasm_bindgen(catch, js_namespace = ["kurentoUtils2", "WebRtcPeer2"], js_name = WebRtcPeer2Sendonly)]
    pub fn web_rtc_peer2_sendonly(options: &JsValue, callback: &Function)
        -> Result<WebRtcPeer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["kurentoUtils2", "WebRtcPeer2"], js_name = WebRtcPeer2Recvonly)]
    pub fn web_rtc_peer2_recvonly(options: &JsValue, callback: &Function)
        -> Result<WebRtcPeer, JsValue>;

    /// `callback(error, sdpOffer)`
    #[wasm_bindgen(method, catch, js_name = generateOffer)]
    pub fn generate_offer(this: &WebRtcPeer, callback: &Function) -> Result<(), JsValue>;

    /// `callback(error, sdpAnswer)`
    #[wasm_bindgen(method, catch, js_name = processOffer)]
    pub fn process_offer(this: &WebRtcPeer, sdp: &str, callback: &Function) -> Result<(), JsValue>;

    /// `callback(error)`
    #[wasm_bindgen(method, catch, js_name = processAnswer)]
    pub fn process_answer(this: &WebRtcPeer, sdp: &str, callback: &Function)
        -> Result<(), JsValue>;

    /// `callback(error)`
    #[wasm_bindgen(method, catch, js_name = addIceCandidate)]
    pub fn add_ice_candidate(
        this: &WebRtcPeer,
        candidate: &JsValue,
        callback: &Function,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn dispose(this: &WebRtcPeer) -> Result<(), JsValue>;

    #[wasm_bindgen(method, getter, js_name = peerConnection)]
    pub fn peer_connection(this: &WebRtcPeer) -> Option<StreamPeerConnection>;

    /// The stream-based (pre-track) surface of `RTCPeerConnection` the tutorials rely on.
    #[derive(Debug, Clone)]
    pub type StreamPeerConnection;

    #[wasm_bindgen(method, catch, js_name = addStream)]
    pub fn add_stream(this: &StreamPeerConnection, stream: &MediaStream) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = removeStream)]
    pub fn remove_stream(this: &StreamPeerConnection, stream: &MediaStream)
        -> Result<(), JsValue>;
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = SockJS)]
    #[derive(Debug, Clone)]
    pub type SockJs;

    #[wasm_bindgen(constructor, catch, js_class = "SockJS")]
    pub fn new(url: &str) -> Result<SockJs, JsValue>;

    /// STOMP client from stomp.js.
    #[derive(Debug, Clone)]
    pub type StompClient;

    #[wasm_bindgen(catch, js_namespace = Stomp, js_name = over)]
    pub fn stomp_over(socket: &SockJs) -> Result<StompClient, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn connect(
        this: &StompClient,
        headers: &JsValue,
        on_connect: &Function,
        on_error: &Function,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn subscribe(
        this: &StompClient,
        destination: &str,
        callback: &Function,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn send(
        this: &StompClient,
        destination: &str,
        headers: &JsValue,
        body: &str,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    pub fn disconnect(this: &StompClient) -> Result<(), JsValue>;

    #[derive(Debug, Clone)]
    pub type StompMessage;

    #[wasm_bindgen(method, getter)]
    pub fn body(this: &StompMessage) -> String;
}
