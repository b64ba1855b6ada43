//! Hub lifecycle state

use std::fmt;

/// Lifecycle state of a hub
///
/// Transitions are monotonic: `Open → Closing → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HubState {
    /// Accepting publishes and new subscribers
    Open,
    /// Shutdown requested, waiting for existing subscribers to disconnect
    Closing,
    /// All subscribers gone, actor stopped, replay buffer cleared
    Closed,
}

impl HubState {
    /// Check if the hub still accepts publishes and subscribers
    pub fn is_open(self) -> bool {
        self == HubState::Open
    }

    /// Check if shutdown has started (`Closing` or `Closed`)
    pub fn is_closing(self) -> bool {
        self != HubState::Open
    }
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubState::Open => "open",
            HubState::Closing => "closing",
            HubState::Closed => "closed",
        };
        f.write_str(name)
    }
}
