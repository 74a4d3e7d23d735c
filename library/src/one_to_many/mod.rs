/*!
One-to-many pages backed by a selective forwarding unit.

The first browser to register becomes the presenter and every later one a
viewer ([`multibrowser`]). The multi-session page instead keeps the presenter
and any number of viewers side by side in a single browser, each one a
separate media session on the server identified by a [`UserId`]
([`multisession`]).

Both pages send the presenter's stream with optional simulcast, chosen
before starting.
*/

pub mod multibrowser;
pub mod multisession;

pub use multibrowser::MultiBrowserSession;
pub use multisession::MultiSessionSession;
use rtc_tutorials_protocol::UserId;

use crate::affordance::{Affordances, Control};
use crate::session::SessionState;

/// Media session key of the presenter on the multi-session page.
pub const PRESENTER: &str = "presenter";

#[must_use]
pub fn presenter_id() -> UserId {
    UserId::from(PRESENTER)
}

/// Media session key of the `index`-th viewer on the multi-session page.
#[must_use]
pub fn viewer_id(index: u32) -> UserId {
    UserId::new(format!("viewer{index}"))
}

/// Controls shared by both pages: the simulcast switch is only editable while idle.
fn affordances(state: SessionState, streaming: &[Control]) -> Affordances {
    match state {
        SessionState::CanStart => Affordances::from([Control::Start, Control::Simulcast]),
        SessionState::Starting => Affordances::none(),
        SessionState::CanStop => streaming.iter().copied().collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn viewer_ids_are_numbered_from_zero() {
        assert_eq!(viewer_id(0).as_str(), "viewer0");
        assert_eq!(viewer_id(12).as_str(), "viewer12");
        assert_eq!(presenter_id().as_str(), "presenter");
    }

    #[test]
    fn simulcast_is_locked_once_started() {
        assert!(affordances(SessionState::CanStart, &[]).is_enabled(Control::Simulcast));
        assert!(affordances(SessionState::Starting, &[Control::Stop]).is_empty());
        let streaming = affordances(SessionState::CanStop, &[Control::Stop]);
        assert!(!streaming.is_enabled(Control::Simulcast));
        assert!(streaming.is_enabled(Control::Stop));
    }
}
