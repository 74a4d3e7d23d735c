use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;
use js_sys::{Function, Object, Reflect};
use log::{debug, error, info, warn};
use rtc_tutorials_protocol::notification::Notification;
use rtc_tutorials_protocol::request::Request;
use rtc_tutorials_protocol::response::CallReply;
use rtc_tutorials_protocol::stomp;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

use super::bindings::{
    stomp_over, JsonRpcClient, RpcRequest, SockJs, StompClient, StompMessage,
};
use super::{describe, from_js, to_js};
use crate::config::SignalingConfig;
use crate::driver::{EventSink, SignalingChannel};
use crate::session::{Event, IncomingCallId};
use crate::{Error, Result};

type Subscriber = Rc<RefCell<Option<EventSink>>>;

fn deliver(subscriber: &Subscriber, event: Event) {
    let events = subscriber.borrow().clone();
    match events {
        Some(events) => events.emit(event),
        None => warn!("no session attached, dropping {}", event.name()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig<'a> {
    send_close_message: bool,
    ws: WsConfig<'a>,
    rpc: RpcConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WsConfig<'a> {
    uri: &'a str,
    #[serde(rename = "useSockJS")]
    use_sockjs: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcConfig {
    request_timeout: u32,
}

/// Server-to-client methods the tutorial backends may invoke.
const NOTIFICATIONS: [&str; 2] = ["iceCandidate", "viewerNegotiation"];

/// JSON-RPC over WebSocket (or SockJS) through kurento-jsonrpc.
pub struct JsonRpcChannel {
    client: JsonRpcClient,
    subscriber: Subscriber,
    incoming: Rc<RefCell<HashMap<IncomingCallId, RpcRequest>>>,
}

impl JsonRpcChannel {
    /// # Errors
    /// Fails if the client library is missing or rejects the configuration.
    pub fn connect(uri: &str, config: &SignalingConfig) -> anyhow::Result<Self> {
        let subscriber: Subscriber = Rc::new(RefCell::new(None));
        let incoming = Rc::new(RefCell::new(HashMap::new()));

        let client_config = to_js(&ClientConfig {
            send_close_message: config.send_close_message,
            ws: WsConfig {
                uri,
                use_sockjs: config.use_sockjs,
            },
            rpc: RpcConfig {
                request_timeout: config.request_timeout_ms,
            },
        })?;
        let rpc: Object = Reflect::get(&client_config, &"rpc".into())
            .map_err(|err| anyhow!("invalid client config: {}", describe(&err)))?
            .unchecked_into();

        for method in NOTIFICATIONS {
            let subscriber = Rc::clone(&subscriber);
            let handler = Closure::wrap(Box::new(move |params: JsValue| {
                let notification = from_js(&params)
                    .and_then(|params| Notification::from_rpc(method, params).map_err(Error::from));
                match notification {
                    Ok(notification) => deliver(&subscriber, Event::Notification(notification)),
                    Err(err) => error!("bad {} notification: {}", method, err),
                }
            }) as Box<dyn FnMut(JsValue)>);
            Reflect::set(&rpc, &method.into(), handler.as_ref().unchecked_ref())
                .map_err(|err| anyhow!("failed to register {}: {}", method, describe(&err)))?;
            handler.forget();
        }

        {
            let subscriber = Rc::clone(&subscriber);
            let incoming = Rc::clone(&incoming);
            let next_call = Cell::new(1_u64);
            let handler = Closure::wrap(Box::new(move |params: JsValue, request: JsValue| {
                let caller = from_js(&params).ok().and_then(|params| {
                    match Notification::from_rpc("incomingCall", params) {
                        Ok(Notification::IncomingCall { caller }) => Some(caller),
                        _ => None,
                    }
                });
                let Some(caller) = caller else {
                    error!("incoming call without a caller");
                    return;
                };
                let call = IncomingCallId(next_call.get());
                next_call.set(next_call.get() + 1);
                incoming.borrow_mut().insert(call, request.unchecked_into());
                deliver(&subscriber, Event::IncomingCall { call, caller });
            }) as Box<dyn FnMut(JsValue, JsValue)>);
            Reflect::set(&rpc, &"incomingCall".into(), handler.as_ref().unchecked_ref())
                .map_err(|err| anyhow!("failed to register incomingCall: {}", describe(&err)))?;
            handler.forget();
        }

        info!("connecting to {}", uri);
        let client = JsonRpcClient::new(&client_config)
            .map_err(|err| anyhow!("failed to create JSON-RPC client: {}", describe(&err)))?;
        Ok(Self {
            client,
            subscriber,
            incoming,
        })
    }
}

fn outcome(error: &JsValue, result: &JsValue) -> Result<Value> {
    if error.is_null() || error.is_undefined() {
        from_js(result)
    } else {
        Err(Error::Signaling(describe(error)))
    }
}

impl SignalingChannel for JsonRpcChannel {
    fn subscribe(&self, events: EventSink) {
        *self.subscriber.borrow_mut() = Some(events);
    }

    fn send(&self, request: &Request, on_response: Box<dyn FnOnce(Result<Value>)>) {
        let params = match request
            .params()
            .map_err(Error::from)
            .and_then(|params| to_js(&params))
        {
            Ok(params) => params,
            Err(err) => return on_response(Err(err)),
        };
        debug!("-> {}", request.method());

        let slot = Rc::new(RefCell::new(Some(on_response)));
        let callback_slot = Rc::clone(&slot);
        let callback = Closure::once_into_js(move |error: JsValue, result: JsValue| {
            let on_response = callback_slot.borrow_mut().take();
            if let Some(on_response) = on_response {
                on_response(outcome(&error, &result));
            }
        });
        let callback: &Function = callback.unchecked_ref();
        if let Err(err) = self.client.send(request.method(), &params, callback) {
            let on_response = slot.borrow_mut().take();
            if let Some(on_response) = on_response {
                on_response(Err(Error::Signaling(describe(&err))));
            }
        }
    }

    fn reply_incoming_call(&self, call: IncomingCallId, reply: &CallReply) {
        let request = self.incoming.borrow_mut().remove(&call);
        let Some(request) = request else {
            warn!("no pending incoming call #{}", call.0);
            return;
        };
        let sent = to_js(reply).map_err(|err| err.to_string()).and_then(|reply| {
            request
                .reply(&JsValue::NULL, &reply)
                .map_err(|err| describe(&err))
        });
        if let Err(err) = sent {
            error!("failed to answer incoming call: {}", err);
        }
    }

    fn close(&self) {
        if let Err(err) = self.client.close() {
            error!("failed to close JSON-RPC client: {}", describe(&err));
        }
    }
}

/// STOMP over SockJS, as served by the Spring messaging loopback backend.
pub struct StompChannel {
    client: StompClient,
    connected: Rc<Cell<bool>>,
    backlog: Rc<RefCell<Vec<(&'static str, String)>>>,
    subscriber: Subscriber,
}

impl StompChannel {
    /// # Errors
    /// Fails if SockJS or stomp.js are missing or refuse the endpoint.
    pub fn connect(uri: &str) -> anyhow::Result<Self> {
        let socket =
            SockJs::new(uri).map_err(|err| anyhow!("failed to open SockJS: {}", describe(&err)))?;
        let client = stomp_over(&socket)
            .map_err(|err| anyhow!("failed to create STOMP client: {}", describe(&err)))?;
        let channel = Self {
            client,
            connected: Rc::new(Cell::new(false)),
            backlog: Rc::new(RefCell::new(Vec::new())),
            subscriber: Rc::new(RefCell::new(None)),
        };

        let on_connect = {
            let client = channel.client.clone();
            let connected = Rc::clone(&channel.connected);
            let backlog = Rc::clone(&channel.backlog);
            let subscriber = Rc::clone(&channel.subscriber);
            Closure::once_into_js(move |_frame: JsValue| {
                info!("STOMP connected");
                for destination in stomp::SUBSCRIPTIONS {
                    let subscriber = Rc::clone(&subscriber);
                    let handler = Closure::wrap(Box::new(move |message: StompMessage| {
                        match Notification::from_stomp(destination, &message.body()) {
                            Ok(notification) => {
                                deliver(&subscriber, Event::Notification(notification));
                            }
                            Err(err) => error!("bad message on {}: {}", destination, err),
                        }
                    }) as Box<dyn FnMut(StompMessage)>);
                    if let Err(err) = client.subscribe(destination, handler.as_ref().unchecked_ref())
                    {
                        error!("failed to subscribe to {}: {}", destination, describe(&err));
                    }
                    handler.forget();
                }
                connected.set(true);
                let pending = std::mem::take(&mut *backlog.borrow_mut());
                for (destination, body) in pending {
                    send_frame(&client, destination, &body);
                }
            })
        };
        let on_error = {
            let subscriber = Rc::clone(&channel.subscriber);
            let connected = Rc::clone(&channel.connected);
            Closure::wrap(Box::new(move |error: JsValue| {
                connected.set(false);
                let message = describe(&error);
                error!("STOMP connection error: {}", message);
                deliver(
                    &subscriber,
                    Event::Notification(Notification::ServerError { message }),
                );
            }) as Box<dyn FnMut(JsValue)>)
        };
        channel
            .client
            .connect(
                &Object::new(),
                on_connect.unchecked_ref(),
                on_error.as_ref().unchecked_ref(),
            )
            .map_err(|err| anyhow!("failed to connect STOMP client: {}", describe(&err)))?;
        on_error.forget();
        Ok(channel)
    }
}

fn send_frame(client: &StompClient, destination: &str, body: &str) -> bool {
    debug!("-> {}", destination);
    match client.send(destination, &Object::new(), body) {
        Ok(()) => true,
        Err(err) => {
            error!("failed to send to {}: {}", destination, describe(&err));
            false
        }
    }
}

impl SignalingChannel for StompChannel {
    fn subscribe(&self, events: EventSink) {
        *self.subscriber.borrow_mut() = Some(events);
    }

    /// Frames carry no reply; a frame handed to the client counts as delivered.
    fn send(&self, request: &Request, on_response: Box<dyn FnOnce(Result<Value>)>) {
        match stomp::frame_for(request) {
            Ok(Some((destination, body))) => {
                if !self.connected.get() {
                    debug!("not connected yet, queueing {}", destination);
                    self.backlog.borrow_mut().push((destination, body));
                    on_response(Ok(Value::Null));
                } else if send_frame(&self.client, destination, &body) {
                    on_response(Ok(Value::Null));
                } else {
                    on_response(Err(Error::Signaling(format!(
                        "failed to send to {destination}"
                    ))));
                }
            }
            Ok(None) => on_response(Err(Error::Signaling(format!(
                "{} is not available over STOMP",
                request.method()
            )))),
            Err(err) => on_response(Err(err.into())),
        }
    }

    fn reply_incoming_call(&self, call: IncomingCallId, _: &CallReply) {
        warn!("STOMP pages do not take calls, ignoring #{}", call.0);
    }

    fn close(&self) {
        if let Err(err) = self.client.disconnect() {
            error!("failed to disconnect STOMP client: {}", describe(&err));
        }
    }
}
