use dbp_core::CodecError;
use dbp_dict::AppKind;
use thiserror::Error;

/// Errors raised by connections, the handshake and the peer state machine.
#[derive(Error, Debug)]
pub enum PeerError {
    // Handshake validation.
    #[error("missing Origin-Host AVP")]
    MissingOriginHost,

    #[error("missing Origin-Realm AVP")]
    MissingOriginRealm,

    #[error("missing application AVP")]
    MissingApplication,

    #[error("missing Result-Code AVP")]
    MissingResultCode,

    #[error("no common {kind} application {id}")]
    NoCommonApplication { id: u32, kind: AppKind },

    #[error("no common security mechanism")]
    NoCommonSecurity,

    #[error("handshake failed with Result-Code {0}")]
    FailedResultCode(u32),

    #[error("handshake timeout (no response)")]
    HandshakeTimeout,

    // Connection lifecycle.
    #[error("watchdog failure (no answer from peer)")]
    WatchdogFailure,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for peer operations.
pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_common_application_display() {
        let err = PeerError::NoCommonApplication {
            id: 2,
            kind: AppKind::Acct,
        };
        assert!(err.to_string().contains("acct application 2"));

        let err = PeerError::NoCommonApplication {
            id: 1002,
            kind: AppKind::Auth,
        };
        assert!(err.to_string().contains("auth application 1002"));
    }
}
