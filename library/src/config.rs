use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_VIDEO_HEIGHT, DEFAULT_VIDEO_WIDTH,
};
use crate::session::Session;

/// How a page reaches its signaling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignalingConfig {
    /// Full endpoint URI; derived from the page location when absent.
    pub uri: Option<String>,
    pub request_timeout_ms: u32,
    /// Tell the server when the connection is closed on purpose.
    pub send_close_message: bool,
    pub use_sockjs: bool,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            uri: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            send_close_message: true,
            use_sockjs: true,
        }
    }
}

impl SignalingConfig {
    /// Endpoint URI for `page` served from `host`.
    #[must_use]
    pub fn uri_for(&self, page: Page, host: &str) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("https://{host}{}", page.endpoint()))
    }
}

/// Camera and microphone request, serialized as a `getUserMedia` constraints object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: VideoConstraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: VideoConstraints::default(),
        }
    }
}

/// Everything a page can be configured with from its host document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub signaling: SignalingConfig,
    pub media: MediaConstraints,
}

/// The tutorial pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    #[cfg(feature = "loopback")]
    Loopback,
    #[cfg(feature = "loopback")]
    LoopbackStomp,
    #[cfg(feature = "one-to-one")]
    OneToOne,
    #[cfg(feature = "one-to-many")]
    SfuMultiBrowser,
    #[cfg(feature = "one-to-many")]
    SfuMultiSession,
    #[cfg(feature = "multistream")]
    MultiStream,
}

/// Signaling transport used by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    JsonRpc,
    Stomp,
}

impl Page {
    /// Path of the signaling endpoint on the tutorial server.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            #[cfg(feature = "loopback")]
            Self::Loopback | Self::LoopbackStomp => "/loopback",
            #[cfg(feature = "one-to-one")]
            Self::OneToOne => "/one2one",
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiBrowser => "/sfu-multibrowser",
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiSession => "/sfu-multisession",
            #[cfg(feature = "multistream")]
            Self::MultiStream => "/peerconnection",
        }
    }

    #[must_use]
    pub const fn transport(self) -> Transport {
        match self {
            #[cfg(feature = "loopback")]
            Self::LoopbackStomp => Transport::Stomp,
            #[allow(unreachable_patterns)]
            _ => Transport::JsonRpc,
        }
    }

    /// Fresh session machine for this page.
    #[must_use]
    pub fn session(self) -> Box<dyn Session> {
        match self {
            #[cfg(feature = "loopback")]
            Self::Loopback => Box::new(crate::loopback::LoopbackSession::new(
                crate::loopback::Flavor::JsonRpc,
            )),
            #[cfg(feature = "loopback")]
            Self::LoopbackStomp => Box::new(crate::loopback::LoopbackSession::new(
                crate::loopback::Flavor::Stomp,
            )),
            #[cfg(feature = "one-to-one")]
            Self::OneToOne => Box::new(crate::one_to_one::OneToOneSession::new()),
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiBrowser => Box::new(crate::one_to_many::MultiBrowserSession::new()),
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiSession => Box::new(crate::one_to_many::MultiSessionSession::new()),
            #[cfg(feature = "multistream")]
            Self::MultiStream => Box::new(crate::multistream::MultiStreamSession::new()),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "loopback")]
            Self::Loopback => "loopback",
            #[cfg(feature = "loopback")]
            Self::LoopbackStomp => "loopback-stomp",
            #[cfg(feature = "one-to-one")]
            Self::OneToOne => "one2one",
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiBrowser => "sfu-multibrowser",
            #[cfg(feature = "one-to-many")]
            Self::SfuMultiSession => "sfu-multisession",
            #[cfg(feature = "multistream")]
            Self::MultiStream => "peerconnection",
        }
    }
}

impl Display for Page {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            #[cfg(feature = "loopback")]
            "loopback" => Ok(Self::Loopback),
            #[cfg(feature = "loopback")]
            "loopback-stomp" => Ok(Self::LoopbackStomp),
            #[cfg(feature = "one-to-one")]
            "one2one" => Ok(Self::OneToOne),
            #[cfg(feature = "one-to-many")]
            "sfu-multibrowser" => Ok(Self::SfuMultiBrowser),
            #[cfg(feature = "one-to-many")]
            "sfu-multisession" => Ok(Self::SfuMultiSession),
            #[cfg(feature = "multistream")]
            "peerconnection" => Ok(Self::MultiStream),
            other => Err(format!("unknown page: {other}")),
        }
    }
}
