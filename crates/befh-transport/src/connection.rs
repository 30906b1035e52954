use std::fmt;

/// Lifecycle of a duplex message connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ConnectionState::as_u8`]; unknown values read as closed.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Transport error with a short, stable kind used in log lines.
pub trait TransportError: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> &'static str;
}

/// Owned handle to one persistent outbound message stream.
///
/// Every call blocks the calling thread until the underlying I/O settles.
pub trait Connection {
    type Error: TransportError;

    /// Current state as last observed by the transport.
    fn state(&self) -> ConnectionState;

    /// Writes one text message.
    fn send_text(&mut self, text: &str) -> Result<(), Self::Error>;
}

/// Factory for [`Connection`]s.
pub trait Connector {
    type Connection: Connection;
    type Error: TransportError;

    /// Opens a connection to `uri`, returning once setup has finished.
    fn connect(&mut self, uri: &str) -> Result<Self::Connection, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::ConnectionState;

    #[test]
    fn state_round_trips_through_raw_value() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(42), ConnectionState::Closed);
        assert_eq!(ConnectionState::Open.as_u8(), 1);
    }

    #[test]
    fn only_open_is_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Closing.is_open());
        assert!(!ConnectionState::Closed.is_open());
        assert_eq!(ConnectionState::Closing.to_string(), "CLOSING");
    }
}
