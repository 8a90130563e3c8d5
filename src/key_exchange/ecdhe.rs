use std::sync::Arc;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::{select_signature_scheme, verify_signature, KeyExchangeContext};
use crate::codec::{decode_all, parse_opaque8, write_opaque8};
use crate::crypto::{ActiveKeyExchange, Secret, TlsCertificate};
use crate::message::DigitallySigned;
use crate::types::{KeyKind, NamedGroup};
use crate::{AlertDescription, Error};

/// ECCurveType named_curve (RFC 8422 5.4).
const NAMED_CURVE: u8 = 3;

/// Ephemeral ECDH signed with the server certificate (RFC 8422).
pub(crate) struct EcdheKeyExchange {
    key_kind: KeyKind,
    server_certificate: Option<Arc<dyn TlsCertificate>>,
    local: Option<Box<dyn ActiveKeyExchange>>,
    peer_point: Option<Vec<u8>>,
    pub(super) pre_master_secret: Option<Secret>,
}

struct ServerEcdhParams<'a> {
    curve_type: u8,
    group: NamedGroup,
    point: &'a [u8],
}

fn parse_params(input: &[u8]) -> IResult<&[u8], ServerEcdhParams<'_>> {
    let (input, curve_type) = be_u8(input)?;
    let (input, group) = be_u16(input)?;
    let (input, point) = parse_opaque8(input)?;
    Ok((
        input,
        ServerEcdhParams {
            curve_type,
            group: NamedGroup::from_u16(group),
            point,
        },
    ))
}

impl EcdheKeyExchange {
    pub fn new(key_kind: KeyKind) -> Self {
        EcdheKeyExchange {
            key_kind,
            server_certificate: None,
            local: None,
            peer_point: None,
            pre_master_secret: None,
        }
    }

    /// First group in our preference order the client can do.
    fn select_group(ctx: &KeyExchangeContext<'_>) -> Result<NamedGroup, Error> {
        ctx.config
            .groups()
            .iter()
            .copied()
            .filter(|g| g.is_ecdhe())
            .filter(|g| ctx.provider().find_kx_group(*g).is_some())
            .find(|g| ctx.client_groups.map_or(true, |client| client.contains(g)))
            .ok_or_else(|| Error::HandshakeFailure("no common elliptic curve group".into()))
    }

    fn start(
        ctx: &KeyExchangeContext<'_>,
        group: NamedGroup,
    ) -> Result<Box<dyn ActiveKeyExchange>, Error> {
        ctx.provider()
            .find_kx_group(group)
            .ok_or_else(|| Error::InternalError(format!("{:?} not supported by provider", group)))?
            .start_exchange()
            .map_err(Error::CryptoError)
    }

    pub fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        let group = Self::select_group(ctx)?;
        let local = Self::start(ctx, group)?;

        let mut params = vec![NAMED_CURVE];
        params.extend_from_slice(&group.as_u16().to_be_bytes());
        write_opaque8(&mut params, local.pub_key(), "ECDH point")?;
        self.local = Some(local);

        let signer = ctx.signer()?;
        let scheme =
            select_signature_scheme(ctx.config, ctx.version, signer.as_ref(), ctx.peer_schemes)?;
        let signature = signer
            .sign(scheme, &ctx.signed_params(&params))
            .map_err(Error::CryptoError)?;
        debug!("ECDHE with {:?}, signed with {:?}", group, scheme);

        let mut body = params;
        DigitallySigned::new(scheme, signature).serialize(&mut body)?;
        Ok(body)
    }

    pub fn process_server_certificate(
        &mut self,
        certificate: Arc<dyn TlsCertificate>,
    ) -> Result<(), Error> {
        if certificate.key_kind() != self.key_kind {
            return Err(Error::Fatal(
                AlertDescription::UnsupportedCertificate,
                format!(
                    "{:?} certificate for a {:?} suite",
                    certificate.key_kind(),
                    self.key_kind
                ),
            ));
        }
        self.server_certificate = Some(certificate);
        Ok(())
    }

    pub fn process_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let with_scheme = ctx.version.has_signature_algorithms();
        let (params, raw_params, signed) = decode_all(
            body,
            |input| {
                let (rest, params) = parse_params(input)?;
                let raw = &input[..input.len() - rest.len()];
                let (rest, signed) = DigitallySigned::parse(rest, with_scheme)?;
                Ok((rest, (params, raw, signed)))
            },
            "ServerKeyExchange",
        )?;

        if params.curve_type != NAMED_CURVE {
            return Err(Error::IllegalParameter(format!(
                "curve type {}",
                params.curve_type
            )));
        }
        if !params.group.is_ecdhe() || !ctx.config.groups().contains(&params.group) {
            return Err(Error::IllegalParameter(format!(
                "server chose group {:?}",
                params.group
            )));
        }
        if params.point.is_empty() {
            return Err(Error::DecodeError("empty ECDH point".into()));
        }

        let certificate = self
            .server_certificate
            .as_ref()
            .ok_or_else(|| {
                Error::UnexpectedMessage("ServerKeyExchange before Certificate".into())
            })?;
        verify_signature(
            ctx.config,
            ctx.version,
            certificate.as_ref(),
            &signed,
            &ctx.signed_params(raw_params),
        )?;

        self.local = Some(Self::start(ctx, params.group)?);
        self.peer_point = Some(params.point.to_vec());
        debug!("ECDHE with {:?}", params.group);
        Ok(())
    }

    pub fn generate_client_key_exchange(&mut self) -> Result<Vec<u8>, Error> {
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::InternalError("no ECDH exchange started".into()))?;
        let peer = self
            .peer_point
            .take()
            .ok_or_else(|| Error::InternalError("no server ECDH point".into()))?;
        let mut body = Vec::new();
        write_opaque8(&mut body, local.pub_key(), "ECDH point")?;
        let secret = local.complete(&peer).map_err(Error::IllegalParameter)?;
        self.pre_master_secret = Some(secret);
        Ok(body)
    }

    pub fn process_client_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let point = decode_all(body, parse_opaque8, "ClientKeyExchange")?;
        if point.is_empty() {
            return Err(Error::DecodeError("empty ECDH point".into()));
        }
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::InternalError("no ECDH exchange started".into()))?;
        let secret = local.complete(point).map_err(Error::IllegalParameter)?;
        self.pre_master_secret = Some(secret);
        Ok(())
    }
}
