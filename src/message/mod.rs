//! Handshake message model.
//!
//! Each message parses with nom (`parse(input) -> IResult`) and checks its
//! semantic rules in `decode(body) -> Result<_, Error>`. Serializers that
//! enforce a length invariant return `Result`, so an invalid message is
//! rejected before it reaches the wire.

mod certificate;
mod certificate_request;
mod digitally_signed;
pub mod extensions;
mod handshake;
mod hello;
mod key_update;
mod new_session_ticket;
mod psk_identity;
mod status;
mod supplemental_data;

pub use certificate::{Certificate, CertificateEntry};
pub use certificate_request::{CertificateRequest, CertificateRequestTls13, ClientCertificateType};
pub use digitally_signed::DigitallySigned;
pub use extensions::{
    Extensions, HeartbeatMode, KeyShareEntry, MaxFragmentLength, NameType, ServerName,
    TrustedAuthority,
};
pub use handshake::{
    HandshakeHeader, HandshakeMessage, DTLS_HANDSHAKE_HEADER_LEN, MAX_HANDSHAKE_LEN,
    TLS_HANDSHAKE_HEADER_LEN,
};
pub use hello::{ClientHello, HelloVerifyRequest, ServerHello, COMPRESSION_NULL};
pub use key_update::KeyUpdate;
pub use new_session_ticket::NewSessionTicket;
pub use psk_identity::PskIdentity;
pub use status::{
    CertificateStatus, CertificateStatusRequest, CertificateStatusRequestItemV2,
    CertificateStatusType, OcspStatusRequest,
};
pub use supplemental_data::SupplementalDataEntry;
