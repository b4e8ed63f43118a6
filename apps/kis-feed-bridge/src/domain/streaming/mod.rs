//! Connection State Machine
//!
//! Lifecycle of the streaming session, independent of the transport.
//! The client drives it with [`ConnectionEvent`]s and publishes the
//! resulting [`ConnectionState`] to observers.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──handshake ok──▶ Connected ──sent──▶ Subscribed
//!                               ▲  │ handshake failed          │ transport failed │
//!                               │  ▼                           ▼                  ▼
//!                               └── Reconnecting ◀─────────────┴──────────────────┘
//!
//! any state except Closed ──close──▶ Closed (terminal)
//! ```

// =============================================================================
// Connection State
// =============================================================================

/// Current state of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started.
    #[default]
    Disconnected,

    /// Fetching an approval key and performing the WebSocket handshake.
    Connecting,

    /// Handshake done; stored subscriptions not yet replayed.
    Connected,

    /// Subscriptions sent; frames are flowing.
    Subscribed,

    /// Waiting out a backoff delay before the next connect.
    Reconnecting,

    /// Closed on request. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether a live socket exists.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Subscribed)
    }

    /// Whether the session has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Numeric value exported on the connection-state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Subscribed => 3.0,
            Self::Reconnecting => 4.0,
            Self::Closed => 5.0,
        }
    }

    /// Apply `event`, returning the next state or `None` if the pair is not
    /// a legal transition.
    #[must_use]
    pub const fn next(self, event: ConnectionEvent) -> Option<Self> {
        use ConnectionEvent as E;

        match (self, event) {
            (Self::Closed, _) => None,
            (_, E::CloseRequested) => Some(Self::Closed),
            (Self::Disconnected | Self::Reconnecting, E::ConnectRequested) => {
                Some(Self::Connecting)
            }
            (Self::Connecting, E::HandshakeSucceeded) => Some(Self::Connected),
            (Self::Connecting, E::HandshakeFailed)
            | (Self::Connected | Self::Subscribed, E::TransportFailed) => {
                Some(Self::Reconnecting)
            }
            (Self::Connected | Self::Subscribed, E::SubscriptionsSent) => Some(Self::Subscribed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Connection Event
// =============================================================================

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connect attempt is starting.
    ConnectRequested,
    /// Approval key obtained and WebSocket handshake completed.
    HandshakeSucceeded,
    /// Approval key fetch or handshake failed.
    HandshakeFailed,
    /// Subscription messages were written to the socket.
    SubscriptionsSent,
    /// The socket closed or errored.
    TransportFailed,
    /// `close()` was called.
    CloseRequested,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use ConnectionEvent as E;
    use ConnectionState as S;

    #[test_case(S::Disconnected, E::ConnectRequested => Some(S::Connecting) ; "start")]
    #[test_case(S::Reconnecting, E::ConnectRequested => Some(S::Connecting) ; "retry")]
    #[test_case(S::Connecting, E::HandshakeSucceeded => Some(S::Connected) ; "handshake ok")]
    #[test_case(S::Connecting, E::HandshakeFailed => Some(S::Reconnecting) ; "handshake failed")]
    #[test_case(S::Connected, E::SubscriptionsSent => Some(S::Subscribed) ; "replayed")]
    #[test_case(S::Subscribed, E::SubscriptionsSent => Some(S::Subscribed) ; "subscribed more")]
    #[test_case(S::Connected, E::TransportFailed => Some(S::Reconnecting) ; "drop before replay")]
    #[test_case(S::Subscribed, E::TransportFailed => Some(S::Reconnecting) ; "drop")]
    #[test_case(S::Reconnecting, E::CloseRequested => Some(S::Closed) ; "close while waiting")]
    #[test_case(S::Subscribed, E::CloseRequested => Some(S::Closed) ; "close while streaming")]
    fn legal_transitions(from: ConnectionState, event: ConnectionEvent) -> Option<ConnectionState> {
        from.next(event)
    }

    #[test_case(S::Disconnected, E::HandshakeSucceeded ; "handshake without connect")]
    #[test_case(S::Connecting, E::SubscriptionsSent ; "send before handshake")]
    #[test_case(S::Connected, E::ConnectRequested ; "connect while connected")]
    #[test_case(S::Reconnecting, E::TransportFailed ; "drop while waiting")]
    #[test_case(S::Disconnected, E::TransportFailed ; "drop while idle")]
    fn illegal_transitions(from: ConnectionState, event: ConnectionEvent) {
        assert_eq!(from.next(event), None);
    }

    #[test]
    fn closed_is_terminal() {
        for event in [
            E::ConnectRequested,
            E::HandshakeSucceeded,
            E::HandshakeFailed,
            E::SubscriptionsSent,
            E::TransportFailed,
            E::CloseRequested,
        ] {
            assert_eq!(S::Closed.next(event), None);
        }
    }

    #[test]
    fn connected_predicates() {
        assert!(S::Connected.is_connected());
        assert!(S::Subscribed.is_connected());
        assert!(!S::Reconnecting.is_connected());
        assert!(S::Closed.is_closed());
        assert_eq!(S::default(), S::Disconnected);
    }
}
