use super::KeyExchangeContext;
use crate::codec::{decode_all, parse_opaque16, write_opaque16};
use crate::crypto::Secret;
use crate::Error;

/// Plain pre-shared key (RFC 4279 2).
#[derive(Default)]
pub(crate) struct PskKeyExchange {
    identity_hint: Option<Vec<u8>>,
    pub(super) identity: Option<Vec<u8>>,
    pub(super) pre_master_secret: Option<Secret>,
}

/// `other_secret` of N zero bytes followed by the key, both with a u16
/// length.
fn pre_master_secret(psk: &[u8]) -> Secret {
    let len = (psk.len() as u16).to_be_bytes();
    let mut pms = Secret::new(Vec::with_capacity(4 + 2 * psk.len()));
    pms.extend_from_slice(&len);
    pms.resize(2 + psk.len(), 0);
    pms.extend_from_slice(&len);
    pms.extend_from_slice(psk);
    pms
}

impl PskKeyExchange {
    /// The identity hint, if the store has one.
    pub fn generate_server_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let Some(hint) = ctx.config.psk_store().and_then(|s| s.identity_hint()) else {
            return Ok(None);
        };
        let mut body = Vec::new();
        write_opaque16(&mut body, &hint, "psk_identity_hint")?;
        Ok(Some(body))
    }

    pub fn process_server_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let hint = decode_all(body, parse_opaque16, "ServerKeyExchange")?;
        trace!("PSK identity hint of {} bytes", hint.len());
        self.identity_hint = Some(hint.to_vec());
        Ok(())
    }

    pub fn generate_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
    ) -> Result<Vec<u8>, Error> {
        let psk = ctx
            .config
            .psk()
            .ok_or_else(|| Error::InternalError("PSK suite without PSK credentials".into()))?;
        let mut body = Vec::new();
        write_opaque16(&mut body, &psk.identity, "psk_identity")?;
        self.identity = Some(psk.identity.clone());
        self.pre_master_secret = Some(pre_master_secret(&psk.key));
        Ok(body)
    }

    pub fn process_client_key_exchange(
        &mut self,
        ctx: &KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let identity = decode_all(body, parse_opaque16, "ClientKeyExchange")?;
        let store = ctx
            .config
            .psk_store()
            .ok_or_else(|| Error::InternalError("PSK suite without PSK store".into()))?;
        let psk = store.lookup(identity).ok_or(Error::UnknownPskIdentity)?;
        debug!("PSK identity {:?}", String::from_utf8_lossy(identity));
        self.identity = Some(identity.to_vec());
        self.pre_master_secret = Some(pre_master_secret(&psk));
        Ok(())
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use std::sync::Arc;

    use super::super::tests::context;
    use super::super::KeyExchange;
    use super::*;
    use crate::credentials::{InMemoryPskStore, PskCredentials};
    use crate::crypto::rust_crypto::default_provider;
    use crate::types::KeyExchangeAlgorithm;
    use crate::Config;

    #[test]
    fn premaster_secret_layout() {
        let pms = pre_master_secret(&[0xAB, 0xCD]);
        assert_eq!(pms.as_slice(), &[0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0xAB, 0xCD]);
    }

    #[test]
    fn identity_lookup() {
        let store = InMemoryPskStore::new().with_identity_hint(b"hint");
        store.insert(b"client", &[7; 16]);
        let server_config = Config::builder()
            .with_crypto_provider(default_provider())
            .with_psk_store(Arc::new(store))
            .build()
            .unwrap();
        let client_config = Config::builder()
            .with_crypto_provider(default_provider())
            .with_psk(PskCredentials::new(b"client", &[7; 16]))
            .build()
            .unwrap();
        let server_ctx = context(&server_config, None);
        let client_ctx = context(&client_config, None);

        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Psk).unwrap();
        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Psk).unwrap();
        let ske = server.generate_server_key_exchange(&server_ctx).unwrap().unwrap();
        assert_eq!(ske, b"\x00\x04hint");
        client.process_server_key_exchange(&client_ctx, &ske).unwrap();

        let cke = client.generate_client_key_exchange(&client_ctx).unwrap();
        server.process_client_key_exchange(&server_ctx, &cke).unwrap();
        assert_eq!(server.psk_identity(), Some(&b"client"[..]));
        assert_eq!(
            client.generate_pre_master_secret().unwrap().as_slice(),
            server.generate_pre_master_secret().unwrap().as_slice()
        );

        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Psk).unwrap();
        assert!(matches!(
            server.process_client_key_exchange(&server_ctx, b"\x00\x05other"),
            Err(Error::UnknownPskIdentity)
        ));
    }

    #[test]
    fn no_hint_no_message() {
        let config = Config::builder()
            .with_crypto_provider(default_provider())
            .with_psk_store(Arc::new(InMemoryPskStore::new()))
            .build()
            .unwrap();
        let ctx = context(&config, None);
        let mut server = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Psk).unwrap();
        assert!(server.generate_server_key_exchange(&ctx).unwrap().is_none());
        let mut client = KeyExchange::for_algorithm(KeyExchangeAlgorithm::Psk).unwrap();
        client.skip_server_key_exchange().unwrap();
    }
}
