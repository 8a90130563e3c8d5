use nom::IResult;

use super::KeyExchangeContext;
use crate::codec::{decode_all, parse_opaque16, parse_opaque8, write_opaque16, write_opaque8};
use crate::crypto::{Secret, SrpGroup, SrpServerExchange};
use crate::Error;

/// SRP-6a without certificate (RFC 5054 2).
#[derive(Default)]
pub(crate) struct SrpKeyExchange {
    server: Option<Box<dyn SrpServerExchange>>,
    pub(super) identity: Option<Vec<u8>>,
    client_public: Option<Vec<u8>>,
    pub(super) pre_master_secret: Option<Secret>,
}

struct ServerSrpParams<'a> {
    prime: &'a [u8],
    generator: &'a [u8],
    salt: &'a [u8],
    public_b: &'a [u8],
}

fn parse_params(input: &[u8]) -> IResult<&[u8], ServerSrpParams<'_>> {
    let (input, prime) = parse_opaque16(input)?;
    let (input, generator) = parse_opaque16(input)?;
    let (input, salt) = parse_opaque8(input)?;
    let (input, public_b) = parse_opaque16(input)?;
    Ok((
        input,
        ServerSrpParams {
            prime,
            generator,
            salt,
            public_b,
        },
    ))
}

impl SrpKeyExchange {
    pub fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        let identity = ctx
            .srp_identity
            .ok_or_else(|| Error::HandshakeFailure("SRP suite without srp extension".into()))?;
        let store = ctx
            .config
            .srp_store()
            .ok_or_else(|| Error::InternalError("SRP suite without SRP store".into()))?;
        let verifier = store.lookup(identity).ok_or(Error::UnknownPskIdentity)?;

        let server = ctx
            .provider()
            .srp_provider
            .server_start(&verifier.group, &verifier.verifier)
            .map_err(Error::CryptoError)?;

        let mut body = Vec::new();
        write_opaque16(&mut body, &verifier.group.prime, "srp_N")?;
        write_opaque16(&mut body, &verifier.group.generator, "srp_g")?;
        write_opaque8(&mut body, &verifier.salt, "srp_s")?;
        write_opaque16(&mut body, server.public_b(), "srp_B")?;

        debug!("SRP for {:?}", String::from_utf8_lossy(identity));
        self.identity = Some(identity.to_vec());
        self.server = Some(server);
        Ok(body)
    }

    pub fn process_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let params = decode_all(body, parse_params, "ServerKeyExchange")?;
        let group = SrpGroup {
            prime: params.prime.to_vec(),
            generator: params.generator.to_vec(),
        };
        if !group.is_known() {
            return Err(Error::InsufficientSecurity("unknown SRP group".into()));
        }
        let credentials = ctx
            .config
            .srp()
            .ok_or_else(|| Error::InternalError("SRP suite without SRP credentials".into()))?;
        let (public_a, secret) = ctx
            .provider()
            .srp_provider
            .client_exchange(
                &group,
                params.salt,
                &credentials.identity,
                &credentials.password,
                params.public_b,
            )
            .map_err(Error::IllegalParameter)?;
        self.identity = Some(credentials.identity.clone());
        self.client_public = Some(public_a);
        self.pre_master_secret = Some(secret);
        Ok(())
    }

    pub fn generate_client_key_exchange(&mut self) -> Result<Vec<u8>, Error> {
        let public_a = self
            .client_public
            .take()
            .ok_or_else(|| Error::InternalError("no SRP client value".into()))?;
        let mut body = Vec::new();
        write_opaque16(&mut body, &public_a, "srp_A")?;
        Ok(body)
    }

    pub fn process_client_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let public_a = decode_all(body, parse_opaque16, "ClientKeyExchange")?;
        let server = self
            .server
            .take()
            .ok_or_else(|| Error::InternalError("no SRP exchange started".into()))?;
        let secret = server.complete(public_a).map_err(Error::IllegalParameter)?;
        self.pre_master_secret = Some(secret);
        Ok(())
    }
}
