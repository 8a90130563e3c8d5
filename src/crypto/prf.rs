//! Key derivation for TLS 1.0 to 1.2 (RFC 5246 5, 6.3, 7.4.9, RFC 7627).

use crate::crypto::provider::{CryptoProvider, Secret};
use crate::crypto::record_cipher::{Aead12Cipher, CbcCipher, RecordCipher};
use crate::types::{CipherSuite, HashAlgorithm, PrfAlgorithm, ProtocolVersion};
use crate::Error;

/// Length of the master secret.
pub(crate) const MASTER_SECRET_LEN: usize = 48;

/// Length of Finished verify data before TLS 1.3.
pub(crate) const VERIFY_DATA_LEN: usize = 12;

/// PRF(secret, label, seed) with the negotiated PRF.
pub(crate) fn prf(
    provider: &CryptoProvider,
    algorithm: PrfAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Secret, Error> {
    let result = match algorithm {
        PrfAlgorithm::Legacy => provider
            .prf_provider
            .prf_legacy(secret, label, seed, output_len),
        PrfAlgorithm::Hash(hash) => provider
            .prf_provider
            .prf_tls12(secret, label, seed, output_len, hash),
    };
    result.map_err(Error::CryptoError)
}

/// master_secret = PRF(pre_master_secret, "master secret",
///                     client_random + server_random)
pub(crate) fn master_secret(
    provider: &CryptoProvider,
    algorithm: PrfAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<Secret, Error> {
    let mut seed = [0; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    prf(
        provider,
        algorithm,
        pre_master_secret,
        "master secret",
        &seed,
        MASTER_SECRET_LEN,
    )
}

/// master_secret = PRF(pre_master_secret, "extended master secret",
///                     session_hash)
pub(crate) fn extended_master_secret(
    provider: &CryptoProvider,
    algorithm: PrfAlgorithm,
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Result<Secret, Error> {
    prf(
        provider,
        algorithm,
        pre_master_secret,
        "extended master secret",
        session_hash,
        MASTER_SECRET_LEN,
    )
}

/// Finished verify data over the transcript hash.
pub(crate) fn verify_data(
    provider: &CryptoProvider,
    algorithm: PrfAlgorithm,
    master_secret: &[u8],
    is_client: bool,
    handshake_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let label = if is_client {
        "client finished"
    } else {
        "server finished"
    };
    let out = prf(
        provider,
        algorithm,
        master_secret,
        label,
        handshake_hash,
        VERIFY_DATA_LEN,
    )?;
    Ok(out.to_vec())
}

/// A read and a write cipher derived from one key block.
pub(crate) struct CipherPair {
    pub read: Box<dyn RecordCipher>,
    pub write: Box<dyn RecordCipher>,
}

/// Expand the master secret and build the cipher pair for one side.
///
/// The key block is split as client MAC key, server MAC key, client key,
/// server key, client IV, server IV.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_cipher_pair(
    provider: &CryptoProvider,
    suite: CipherSuite,
    version: ProtocolVersion,
    algorithm: PrfAlgorithm,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    is_client: bool,
) -> Result<CipherPair, Error> {
    let bulk = suite
        .bulk_cipher()
        .ok_or_else(|| Error::InternalError(format!("{:?} has no bulk cipher", suite)))?;
    let factory = provider
        .find_cipher_suite(suite)
        .ok_or_else(|| Error::InternalError(format!("{:?} not supported by provider", suite)))?;

    let (mac_len, key_len, fixed_iv_len) = factory.key_lengths();
    let chained_iv = !bulk.is_aead() && version.equivalent_tls() == ProtocolVersion::TLSV1_0;
    let iv_len = if bulk.is_aead() || chained_iv {
        fixed_iv_len
    } else {
        0
    };

    let mut seed = [0; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);
    let block = prf(
        provider,
        algorithm,
        master_secret,
        "key expansion",
        &seed,
        2 * (mac_len + key_len + iv_len),
    )?;

    let (client_mac, rest) = block.split_at(mac_len);
    let (server_mac, rest) = rest.split_at(mac_len);
    let (client_key, rest) = rest.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_iv, server_iv) = rest.split_at(iv_len);

    let make = |mac: &[u8], key: &[u8], iv: &[u8]| -> Result<Box<dyn RecordCipher>, Error> {
        if bulk.is_aead() {
            let cipher = factory.create_cipher(key).map_err(Error::CryptoError)?;
            Ok(Box::new(Aead12Cipher::new(cipher, iv)?))
        } else {
            let block = factory
                .create_block_cipher(key)
                .map_err(Error::CryptoError)?;
            let chained = chained_iv.then(|| iv.to_vec());
            Ok(Box::new(CbcCipher::new(
                provider,
                block,
                Secret::new(mac.to_vec()),
                HashAlgorithm::SHA1,
                chained,
            )))
        }
    };

    let client = make(client_mac, client_key, client_iv)?;
    let server = make(server_mac, server_key, server_iv)?;
    let pair = if is_client {
        CipherPair {
            read: server,
            write: client,
        }
    } else {
        CipherPair {
            read: client,
            write: server,
        }
    };
    Ok(pair)
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;
    use crate::types::ContentType;

    #[test]
    fn master_secret_depends_on_prf() {
        let provider = rust_crypto::default_provider();
        let pms = [3_u8; 48];
        let a = master_secret(&provider, PrfAlgorithm::Legacy, &pms, &[1; 32], &[2; 32]).unwrap();
        let b = master_secret(
            &provider,
            PrfAlgorithm::Hash(HashAlgorithm::SHA256),
            &pms,
            &[1; 32],
            &[2; 32],
        )
        .unwrap();
        assert_eq!(a.len(), 48);
        assert_ne!(a.as_slice(), b.as_slice());

        let ems = extended_master_secret(
            &provider,
            PrfAlgorithm::Hash(HashAlgorithm::SHA256),
            &pms,
            &[9; 32],
        )
        .unwrap();
        assert_ne!(ems.as_slice(), b.as_slice());
    }

    #[test]
    fn verify_data_differs_per_side() {
        let provider = rust_crypto::default_provider();
        let alg = PrfAlgorithm::Hash(HashAlgorithm::SHA256);
        let c = verify_data(&provider, alg, &[5; 48], true, &[0; 32]).unwrap();
        let s = verify_data(&provider, alg, &[5; 48], false, &[0; 32]).unwrap();
        assert_eq!(c.len(), VERIFY_DATA_LEN);
        assert_ne!(c, s);
    }

    #[test]
    fn cipher_pairs_interoperate() {
        let provider = rust_crypto::default_provider();
        let cases = [
            (CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256, ProtocolVersion::TLSV1_2),
            (CipherSuite::RSA_AES256_CBC_SHA, ProtocolVersion::TLSV1_0),
            (CipherSuite::RSA_AES128_CBC_SHA, ProtocolVersion::DTLSV1_0),
        ];
        for (suite, version) in cases {
            let alg = suite.prf_algorithm(version);
            let mut client = create_cipher_pair(
                &provider, suite, version, alg, &[8; 48], &[1; 32], &[2; 32], true,
            )
            .unwrap();
            let mut server = create_cipher_pair(
                &provider, suite, version, alg, &[8; 48], &[1; 32], &[2; 32], false,
            )
            .unwrap();

            let (_, sealed) = client
                .write
                .encode_plaintext(0, ContentType::Handshake, version, b"finished")
                .unwrap();
            let (_, plain) = server
                .read
                .decode_ciphertext(0, ContentType::Handshake, version, &sealed)
                .unwrap();
            assert_eq!(plain, b"finished", "{:?}", suite);

            let (_, sealed) = server
                .write
                .encode_plaintext(0, ContentType::ApplicationData, version, b"reply")
                .unwrap();
            let (_, plain) = client
                .read
                .decode_ciphertext(0, ContentType::ApplicationData, version, &sealed)
                .unwrap();
            assert_eq!(plain, b"reply");
        }
    }
}
