pub const DEFAULT_REQUEST_TIMEOUT_MS: u32 = 15_000;
pub const DEFAULT_VIDEO_WIDTH: u32 = 1280;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 720;

/// Poster shown on video elements while idle.
pub const IDLE_POSTER: &str = "./img/webrtc.png";
/// Poster and background shown while a call is being set up.
pub const SPINNER_POSTER: &str = "./img/transparent-1px.png";
pub const SPINNER_BACKGROUND: &str = "center transparent url('./img/spinner.gif') no-repeat";
