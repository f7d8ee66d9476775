use std::fmt;

/// Lifecycle of a producer or consumer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect budget spent; the channel will not come back on its own.
    Failed,
    /// Closed on request or by a clean broker-side close.
    Stopped,
}

impl ChannelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Failed | ChannelState::Stopped)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Failed => "failed",
            ChannelState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
