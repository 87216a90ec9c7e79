use std::fmt;
use std::time::Duration;

/// Connection state published by the stream client.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected and not trying to (initial state, or closed on request).
    #[default]
    Disconnected,
    /// Opening the stream.
    Connecting {
        /// Reconnect attempts made since the last successful open.
        attempt: u32,
    },
    /// Actively receiving events.
    Connected,
    /// The connection was lost; a reconnect is scheduled.
    Reconnecting {
        attempt: u32,
        delay: Duration,
        /// Why the previous connection ended.
        reason: String,
    },
}

impl ConnectionStatus {
    /// Returns `true` if the stream is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting {
                attempt,
                delay,
                reason,
            } => write!(
                f,
                "reconnecting in {}ms (attempt {attempt}): {reason}",
                delay.as_millis()
            ),
        }
    }
}
