use thiserror::Error;

use crate::alert::AlertDescription;

/// Errors produced by the protocol engines.
///
/// Most variants correspond to a TLS alert. When such an error terminates a
/// connection, [`Error::alert_description()`] is the alert sent to the peer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("handshake failure: {0}")]
    HandshakeFailure(String),

    #[error("record overflow: {0}")]
    RecordOverflow(String),

    #[error("bad record mac")]
    BadRecordMac,

    #[error("decrypt error: {0}")]
    DecryptError(String),

    #[error("bad certificate: {0}")]
    BadCertificate(String),

    #[error("protocol version: {0}")]
    ProtocolVersion(String),

    #[error("insufficient security: {0}")]
    InsufficientSecurity(String),

    #[error("inappropriate fallback")]
    InappropriateFallback,

    #[error("unknown psk identity")]
    UnknownPskIdentity,

    #[error("certificate required")]
    CertificateRequired,

    #[error("internal error: {0}")]
    InternalError(String),

    /// Any other alert raised locally.
    #[error("fatal alert {0:?}: {1}")]
    Fatal(AlertDescription, String),

    /// The peer sent a fatal alert.
    #[error("peer sent fatal alert: {0:?}")]
    PeerAlert(AlertDescription),

    /// The connection is closed, either orderly or after a failure.
    #[error("connection closed")]
    Closed,

    #[error("timeout: {0}")]
    Timeout(&'static str),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    CryptoError(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

impl Error {
    /// The alert to send to the peer when this error ends a connection.
    ///
    /// `None` for errors that are not announced (peer alerts, closed
    /// connections, timeouts and transport failures).
    pub fn alert_description(&self) -> Option<AlertDescription> {
        use AlertDescription as A;
        let alert = match self {
            Error::UnexpectedMessage(_) => A::UnexpectedMessage,
            Error::IllegalParameter(_) => A::IllegalParameter,
            Error::DecodeError(_) => A::DecodeError,
            Error::UnsupportedExtension(_) => A::UnsupportedExtension,
            Error::HandshakeFailure(_) => A::HandshakeFailure,
            Error::RecordOverflow(_) => A::RecordOverflow,
            Error::BadRecordMac => A::BadRecordMac,
            Error::DecryptError(_) => A::DecryptError,
            Error::BadCertificate(_) => A::BadCertificate,
            Error::ProtocolVersion(_) => A::ProtocolVersion,
            Error::InsufficientSecurity(_) => A::InsufficientSecurity,
            Error::InappropriateFallback => A::InappropriateFallback,
            Error::UnknownPskIdentity => A::UnknownPskIdentity,
            Error::CertificateRequired => A::CertificateRequired,
            Error::InternalError(_) => A::InternalError,
            Error::CryptoError(_) => A::InternalError,
            Error::ConfigError(_) => A::InternalError,
            Error::Fatal(alert, _) => *alert,
            Error::PeerAlert(_) | Error::Closed | Error::Timeout(_) | Error::Io(_) => {
                return None;
            }
        };
        Some(alert)
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => e,
            Error::Timeout(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, value),
            Error::Closed => std::io::Error::new(std::io::ErrorKind::ConnectionAborted, value),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_mapping() {
        assert_eq!(
            Error::UnexpectedMessage("x".into()).alert_description(),
            Some(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(
            Error::CryptoError("x".into()).alert_description(),
            Some(AlertDescription::InternalError)
        );
        assert_eq!(
            Error::Fatal(AlertDescription::UnrecognizedName, "x".into()).alert_description(),
            Some(AlertDescription::UnrecognizedName)
        );
        assert_eq!(Error::Closed.alert_description(), None);
        assert_eq!(
            Error::PeerAlert(AlertDescription::HandshakeFailure).alert_description(),
            None
        );
    }
}
