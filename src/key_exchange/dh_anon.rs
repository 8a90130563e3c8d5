use super::KeyExchangeContext;
use crate::codec::{decode_all, parse_opaque16, write_opaque16};
use crate::crypto::{strip_leading_zeros, ActiveKeyExchange, DhGroup, Secret};
use crate::Error;

/// Anonymous finite field Diffie-Hellman (RFC 5246 7.4.3). Only the
/// RFC 7919 groups we offer are accepted from a server.
#[derive(Default)]
pub(crate) struct DhAnonKeyExchange {
    local: Option<Box<dyn ActiveKeyExchange>>,
    peer_public: Option<Vec<u8>>,
    pub(super) pre_master_secret: Option<Secret>,
}

impl DhAnonKeyExchange {
    /// Our first FFDHE group, restricted to the client's list when it names
    /// any FFDHE group (RFC 7919 4).
    fn select_group(ctx: &KeyExchangeContext<'_>) -> Result<DhGroup, Error> {
        let client_ffdhe: Option<Vec<_>> = ctx
            .client_groups
            .map(|groups| groups.iter().copied().filter(|g| g.is_ffdhe()).collect())
            .filter(|groups: &Vec<_>| !groups.is_empty());
        ctx.config
            .groups()
            .iter()
            .filter(|g| g.is_ffdhe())
            .filter(|g| client_ffdhe.as_ref().map_or(true, |client| client.contains(g)))
            .find_map(|g| DhGroup::from_named(*g))
            .ok_or_else(|| Error::HandshakeFailure("no common finite field group".into()))
    }

    fn start(
        ctx: &KeyExchangeContext<'_>,
        group: &DhGroup,
    ) -> Result<Box<dyn ActiveKeyExchange>, Error> {
        ctx.provider()
            .dh_provider
            .start_exchange(group)
            .map_err(Error::CryptoError)
    }

    /// The shared secret with leading zero bytes removed (RFC 5246 8.1.2).
    fn complete(local: Box<dyn ActiveKeyExchange>, peer: &[u8]) -> Result<Secret, Error> {
        let shared = local.complete(peer).map_err(Error::IllegalParameter)?;
        Ok(Secret::new(strip_leading_zeros(&shared).to_vec()))
    }

    pub fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        let group = Self::select_group(ctx)?;
        let local = Self::start(ctx, &group)?;
        let mut body = Vec::new();
        write_opaque16(&mut body, &group.prime, "dh_p")?;
        write_opaque16(&mut body, &group.generator, "dh_g")?;
        write_opaque16(&mut body, local.pub_key(), "dh_Ys")?;
        debug!("DH_anon with {:?}", group.named());
        self.local = Some(local);
        Ok(body)
    }

    pub fn process_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let (prime, generator, public) = decode_all(
            body,
            |input| {
                let (input, p) = parse_opaque16(input)?;
                let (input, g) = parse_opaque16(input)?;
                let (input, ys) = parse_opaque16(input)?;
                Ok((input, (p, g, ys)))
            },
            "ServerKeyExchange",
        )?;
        let group = DhGroup {
            prime: prime.to_vec(),
            generator: generator.to_vec(),
        };
        match group.named() {
            Some(named) if ctx.config.groups().contains(&named) => {}
            _ => {
                return Err(Error::InsufficientSecurity(format!(
                    "unknown DH group with {} bit prime",
                    strip_leading_zeros(prime).len() * 8
                )))
            }
        }
        if strip_leading_zeros(public).is_empty() {
            return Err(Error::IllegalParameter("zero DH public value".into()));
        }
        self.local = Some(Self::start(ctx, &group)?);
        self.peer_public = Some(public.to_vec());
        Ok(())
    }

    pub fn generate_client_key_exchange(&mut self) -> Result<Vec<u8>, Error> {
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::InternalError("no DH exchange started".into()))?;
        let peer = self
            .peer_public
            .take()
            .ok_or_else(|| Error::InternalError("no server DH value".into()))?;
        let mut body = Vec::new();
        write_opaque16(&mut body, local.pub_key(), "dh_Yc")?;
        self.pre_master_secret = Some(Self::complete(local, &peer)?);
        Ok(body)
    }

    pub fn process_client_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let public = decode_all(body, parse_opaque16, "ClientKeyExchange")?;
        if strip_leading_zeros(public).is_empty() {
            return Err(Error::IllegalParameter("zero DH public value".into()));
        }
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::InternalError("no DH exchange started".into()))?;
        self.pre_master_secret = Some(Self::complete(local, public)?);
        Ok(())
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::super::tests::{config, context};
    use super::super::KeyExchange;
    use super::*;
    use crate::types::{KeyExchangeAlgorithm, NamedGroup};

    #[test]
    fn both_sides_agree() {
        let config = config();
        let ctx = context(&config, None);
        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::DhAnon).unwrap();
        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::DhAnon).unwrap();

        let ske = server.generate_server_key_exchange(&ctx).unwrap().unwrap();
        client.process_server_key_exchange(&ctx, &ske).unwrap();
        let cke = client.generate_client_key_exchange(&ctx).unwrap();
        server.process_client_key_exchange(&ctx, &cke).unwrap();

        let a = client.generate_pre_master_secret().unwrap();
        let b = server.generate_pre_master_secret().unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a[0], 0);
    }

    #[test]
    fn unknown_group_is_refused() {
        let config = config();
        let ctx = context(&config, None);
        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::DhAnon).unwrap();
        // p = 23, g = 5, Ys = 8
        let ske = [0x00, 0x01, 23, 0x00, 0x01, 5, 0x00, 0x01, 8];
        assert!(matches!(
            client.process_server_key_exchange(&ctx, &ske),
            Err(Error::InsufficientSecurity(_))
        ));
    }

    #[test]
    fn client_ffdhe_list_is_honoured() {
        let config = config();
        let mut ctx = context(&config, None);
        let groups = [NamedGroup::X25519, NamedGroup::Ffdhe3072];
        ctx.client_groups = Some(&groups);
        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::DhAnon).unwrap();
        assert!(matches!(
            server.generate_server_key_exchange(&ctx),
            Err(Error::HandshakeFailure(_))
        ));

        let groups = [NamedGroup::X25519];
        ctx.client_groups = Some(&groups);
        assert!(server.generate_server_key_exchange(&ctx).unwrap().is_some());
    }
}
