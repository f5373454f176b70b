use crate::ids::SessionId;

/// Close codes that mean the peer left on purpose (or simply vanished) and
/// should not be reported as failures: normal, going away, abnormal closure.
const EXPECTED_CLOSE_CODES: [u16; 3] = [1000, 1001, 1006];

/// Failures surfaced by a connection's transport.
/// Classified as an expected disconnect or an unexpected error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },
    #[error("transport i/o error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }

    /// Clean shutdown, going away, or a peer that dropped without a close frame.
    pub fn is_expected_close(&self) -> bool {
        match self {
            Self::Closed { code: None, .. } => true,
            Self::Closed { code: Some(code), .. } => EXPECTED_CLOSE_CODES.contains(code),
            Self::Io(_) | Self::Protocol(_) => false,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed { .. } if self.is_expected_close() => "expected_close",
            Self::Closed { .. } => "unexpected_close",
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Errors returned by the hub's membership operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionId),
    #[error("hub is shut down")]
    Closed,
}

impl HubError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered(_) => "already_registered",
            Self::Closed => "hub_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_and_going_away_are_expected() {
        assert!(TransportError::closed(Some(1000), "bye").is_expected_close());
        assert!(TransportError::closed(Some(1001), "tab closed").is_expected_close());
        assert!(TransportError::closed(Some(1006), "").is_expected_close());
        assert!(TransportError::closed(None, "").is_expected_close());
    }

    #[test]
    fn other_close_codes_are_unexpected() {
        assert!(!TransportError::closed(Some(1002), "protocol").is_expected_close());
        assert!(!TransportError::closed(Some(1011), "server error").is_expected_close());
        assert!(!TransportError::closed(Some(4000), "app").is_expected_close());
    }

    #[test]
    fn io_and_protocol_are_unexpected() {
        assert!(!TransportError::Io("connection reset".into()).is_expected_close());
        assert!(!TransportError::Protocol("bad frame".into()).is_expected_close());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(TransportError::closed(Some(1000), "").error_kind(), "expected_close");
        assert_eq!(TransportError::closed(Some(1011), "").error_kind(), "unexpected_close");
        assert_eq!(TransportError::Io("x".into()).error_kind(), "io");
        assert_eq!(HubError::Closed.error_kind(), "hub_closed");
        assert_eq!(
            HubError::AlreadyRegistered(SessionId::from_raw("sess_1")).error_kind(),
            "already_registered"
        );
    }

    #[test]
    fn display_includes_details() {
        let err = HubError::AlreadyRegistered(SessionId::from_raw("sess_dup"));
        assert!(err.to_string().contains("sess_dup"));
        let err = TransportError::Io("reset by peer".into());
        assert!(err.to_string().contains("reset by peer"));
    }
}
