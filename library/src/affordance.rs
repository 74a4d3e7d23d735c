use std::collections::BTreeSet;

/// Every control a tutorial page may expose.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Control {
    Start,
    Stop,
    Register,
    Call,
    Terminate,
    Play,
    Simulcast,
    AddStream,
    RemoveStream,
    AddViewer,
    StartRecording,
    StopRecording,
}

impl Control {
    /// `id` of the DOM element backing this control.
    #[must_use]
    pub const fn element_id(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Register => "register",
            Self::Call => "call",
            Self::Terminate => "terminate",
            Self::Play => "play",
            Self::Simulcast => "simulcast-checkbox",
            Self::AddStream => "add-stream",
            Self::RemoveStream => "remove-stream",
            Self::AddViewer => "add-viewer",
            Self::StartRecording => "startRecording",
            Self::StopRecording => "stopRecording",
        }
    }
}

/// Set of controls enabled in the current state. Anything not in the set is disabled.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Affordances(BTreeSet<Control>);

impl Affordances {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_enabled(&self, control: Control) -> bool {
        self.0.contains(&control)
    }

    pub fn iter(&self) -> impl Iterator<Item = Control> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Control> for Affordances {
    fn from_iter<T: IntoIterator<Item = Control>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Control; N]> for Affordances {
    fn from(controls: [Control; N]) -> Self {
        controls.into_iter().collect()
    }
}
