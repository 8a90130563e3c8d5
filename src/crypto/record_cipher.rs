//! Record protection.
//!
//! A [`RecordCipher`] holds the key material of one direction. The writer
//! seals with its own keys; the reader opens with the peer's keys, so the
//! same type serves both ends.

use subtle::ConstantTimeEq;

use crate::crypto::provider::{
    BlockCipher, Cipher, CryptoProvider, HmacProvider, SecureRandom, Secret, SupportedCipherSuite,
};
use crate::types::{ContentType, HashAlgorithm, ProtocolVersion};
use crate::Error;

/// Largest plaintext fragment (2^14).
pub(crate) const MAX_PLAINTEXT: usize = 1 << 14;

/// Explicit nonce of the TLS 1.2 AEAD construction (RFC 5288).
const EXPLICIT_NONCE_LEN: usize = 8;

pub(crate) trait RecordCipher: Send {
    /// Largest ciphertext that can carry `plaintext_limit` bytes.
    fn ciphertext_limit(&self, plaintext_limit: usize) -> usize;

    /// Bytes added to a plaintext fragment when sealing it.
    fn write_overhead(&self) -> usize {
        self.ciphertext_limit(0)
    }

    /// Protect one fragment. Returns the outer content type and the
    /// record payload.
    fn encode_plaintext(
        &mut self,
        seq_no: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error>;

    /// Authenticate and decrypt one record payload. Returns the real
    /// content type and the plaintext.
    fn decode_ciphertext(
        &mut self,
        seq_no: u64,
        record_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error>;

    /// Move to the next traffic secret (TLS 1.3 KeyUpdate).
    fn rekey(&mut self) -> Result<(), Error> {
        Err(Error::InternalError("cipher does not support key update".into()))
    }

    fn is_null(&self) -> bool {
        false
    }
}

fn additional_data(
    seq_no: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    len: usize,
) -> [u8; 13] {
    let mut aad = [0; 13];
    aad[..8].copy_from_slice(&seq_no.to_be_bytes());
    aad[8] = content_type.as_u8();
    aad[9..11].copy_from_slice(&version.as_u16().to_be_bytes());
    aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
    aad
}

// ============================================================================
// Null
// ============================================================================

/// Initial state: no protection.
#[derive(Debug, Default)]
pub(crate) struct NullCipher;

impl RecordCipher for NullCipher {
    fn ciphertext_limit(&self, plaintext_limit: usize) -> usize {
        plaintext_limit
    }

    fn encode_plaintext(
        &mut self,
        _seq_no: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        Ok((content_type, plaintext.to_vec()))
    }

    fn decode_ciphertext(
        &mut self,
        _seq_no: u64,
        record_type: ContentType,
        _version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        Ok((record_type, ciphertext.to_vec()))
    }

    fn is_null(&self) -> bool {
        true
    }
}

// ============================================================================
// TLS 1.2 AEAD
// ============================================================================

/// AEAD with a 4 byte implicit salt and an 8 byte explicit nonce equal to
/// the sequence number (RFC 5288).
pub(crate) struct Aead12Cipher {
    cipher: Box<dyn Cipher>,
    fixed_iv: [u8; 4],
}

impl Aead12Cipher {
    pub fn new(cipher: Box<dyn Cipher>, fixed_iv: &[u8]) -> Result<Self, Error> {
        let fixed_iv = fixed_iv
            .try_into()
            .map_err(|_| {
                Error::InternalError(format!("AEAD fixed IV of {} bytes", fixed_iv.len()))
            })?;
        Ok(Aead12Cipher { cipher, fixed_iv })
    }

    fn nonce(&self, explicit: &[u8]) -> [u8; 12] {
        let mut nonce = [0; 12];
        nonce[..4].copy_from_slice(&self.fixed_iv);
        nonce[4..].copy_from_slice(explicit);
        nonce
    }
}

impl RecordCipher for Aead12Cipher {
    fn ciphertext_limit(&self, plaintext_limit: usize) -> usize {
        plaintext_limit + EXPLICIT_NONCE_LEN + self.cipher.tag_len()
    }

    fn encode_plaintext(
        &mut self,
        seq_no: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let explicit = seq_no.to_be_bytes();
        let nonce = self.nonce(&explicit);
        let aad = additional_data(seq_no, content_type, version, plaintext.len());

        let mut data = plaintext.to_vec();
        self.cipher
            .encrypt(&mut data, &aad, &nonce)
            .map_err(Error::CryptoError)?;

        let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + data.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&data);
        Ok((content_type, out))
    }

    fn decode_ciphertext(
        &mut self,
        seq_no: u64,
        record_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let overhead = EXPLICIT_NONCE_LEN + self.cipher.tag_len();
        if ciphertext.len() < overhead {
            return Err(Error::BadRecordMac);
        }
        let (explicit, sealed) = ciphertext.split_at(EXPLICIT_NONCE_LEN);
        let nonce = self.nonce(explicit);
        let aad = additional_data(seq_no, record_type, version, ciphertext.len() - overhead);

        let mut data = sealed.to_vec();
        self.cipher
            .decrypt(&mut data, &aad, &nonce)
            .map_err(|_| Error::BadRecordMac)?;
        Ok((record_type, data))
    }
}

// ============================================================================
// CBC with HMAC
// ============================================================================

/// MAC-then-encrypt block cipher protection (RFC 5246 6.2.3.2).
///
/// TLS 1.1 and later (and DTLS) send a random explicit IV per record.
/// TLS 1.0 chains the IV from the last ciphertext block.
pub(crate) struct CbcCipher {
    block: Box<dyn BlockCipher>,
    mac_key: Secret,
    mac_hash: HashAlgorithm,
    hmac: &'static dyn HmacProvider,
    random: &'static dyn SecureRandom,
    chained_iv: Option<Vec<u8>>,
}

impl CbcCipher {
    pub fn new(
        provider: &CryptoProvider,
        block: Box<dyn BlockCipher>,
        mac_key: Secret,
        mac_hash: HashAlgorithm,
        chained_iv: Option<Vec<u8>>,
    ) -> Self {
        CbcCipher {
            block,
            mac_key,
            mac_hash,
            hmac: provider.hmac_provider,
            random: provider.secure_random,
            chained_iv,
        }
    }

    fn mac(
        &self,
        seq_no: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut input = additional_data(seq_no, content_type, version, data.len()).to_vec();
        input.extend_from_slice(data);
        self.hmac
            .hmac(self.mac_hash, &self.mac_key, &input)
            .map_err(Error::CryptoError)
    }
}

impl RecordCipher for CbcCipher {
    fn ciphertext_limit(&self, plaintext_limit: usize) -> usize {
        plaintext_limit + self.block.block_size() + self.mac_hash.output_len() + 256
    }

    fn write_overhead(&self) -> usize {
        let iv = if self.chained_iv.is_some() {
            0
        } else {
            self.block.block_size()
        };
        iv + self.mac_hash.output_len() + self.block.block_size()
    }

    fn encode_plaintext(
        &mut self,
        seq_no: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let bs = self.block.block_size();
        let mac = self.mac(seq_no, content_type, version, plaintext)?;

        let mut data = Vec::with_capacity(plaintext.len() + mac.len() + bs);
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&mac);
        let pad = bs - (data.len() + 1) % bs;
        let pad = if pad == bs { 0 } else { pad };
        data.extend(std::iter::repeat(pad as u8).take(pad + 1));

        let mut out = Vec::with_capacity(bs + data.len());
        match &mut self.chained_iv {
            Some(iv) => {
                self.block
                    .cbc_encrypt(iv, &mut data)
                    .map_err(Error::CryptoError)?;
                *iv = data[data.len() - bs..].to_vec();
            }
            None => {
                let mut iv = vec![0; bs];
                self.random.fill(&mut iv).map_err(Error::CryptoError)?;
                self.block
                    .cbc_encrypt(&iv, &mut data)
                    .map_err(Error::CryptoError)?;
                out.extend_from_slice(&iv);
            }
        }
        out.extend_from_slice(&data);
        Ok((content_type, out))
    }

    fn decode_ciphertext(
        &mut self,
        seq_no: u64,
        record_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let bs = self.block.block_size();
        let mac_len = self.mac_hash.output_len();
        let iv_len = if self.chained_iv.is_some() { 0 } else { bs };

        let min = iv_len + bs.max(mac_len + 1).div_ceil(bs) * bs;
        if ciphertext.len() < min || (ciphertext.len() - iv_len) % bs != 0 {
            return Err(Error::BadRecordMac);
        }

        let (iv, sealed) = match &mut self.chained_iv {
            Some(chained) => {
                let iv = std::mem::replace(chained, ciphertext[ciphertext.len() - bs..].to_vec());
                (iv, ciphertext)
            }
            None => (ciphertext[..bs].to_vec(), &ciphertext[bs..]),
        };

        let mut data = sealed.to_vec();
        self.block
            .cbc_decrypt(&iv, &mut data)
            .map_err(|_| Error::BadRecordMac)?;

        // Check padding without an early exit, then always compute a MAC.
        let pad = data[data.len() - 1] as usize;
        let mut good = pad + 1 + mac_len <= data.len();
        let pad = if good { pad } else { 0 };
        let pad_start = data.len() - pad - 1;
        for b in &data[pad_start..] {
            good &= *b as usize == pad;
        }

        let content_len = data.len() - pad - 1 - mac_len;
        let received_mac = data[content_len..content_len + mac_len].to_vec();
        data.truncate(content_len);
        let expected_mac = self.mac(seq_no, record_type, version, &data)?;

        let mac_ok: bool = expected_mac.ct_eq(&received_mac).into();
        if !(good & mac_ok) {
            return Err(Error::BadRecordMac);
        }
        Ok((record_type, data))
    }
}

// ============================================================================
// TLS 1.3 AEAD
// ============================================================================

/// TLS 1.3 record protection (RFC 8446 5.2). The nonce is the traffic IV
/// xor the sequence number; the real content type trails the plaintext.
pub(crate) struct Aead13Cipher {
    provider: CryptoProvider,
    suite: &'static dyn SupportedCipherSuite,
    hash: HashAlgorithm,
    secret: Secret,
    cipher: Box<dyn Cipher>,
    iv: Secret,
}

impl Aead13Cipher {
    pub fn new(
        provider: &CryptoProvider,
        suite: &'static dyn SupportedCipherSuite,
        hash: HashAlgorithm,
        secret: Secret,
    ) -> Result<Self, Error> {
        let (cipher, iv) = Self::derive(provider, suite, hash, &secret)?;
        Ok(Aead13Cipher {
            provider: provider.clone(),
            suite,
            hash,
            secret,
            cipher,
            iv,
        })
    }

    fn derive(
        provider: &CryptoProvider,
        suite: &'static dyn SupportedCipherSuite,
        hash: HashAlgorithm,
        secret: &[u8],
    ) -> Result<(Box<dyn Cipher>, Secret), Error> {
        let (_, key_len, iv_len) = suite.key_lengths();
        let hkdf = provider.hkdf_provider;
        let key = hkdf
            .hkdf_expand_label(hash, secret, b"key", &[], key_len)
            .map_err(Error::CryptoError)?;
        let iv = hkdf
            .hkdf_expand_label(hash, secret, b"iv", &[], iv_len)
            .map_err(Error::CryptoError)?;
        let cipher = suite.create_cipher(&key).map_err(Error::CryptoError)?;
        Ok((cipher, iv))
    }

    fn nonce(&self, seq_no: u64) -> Vec<u8> {
        let mut nonce = self.iv.to_vec();
        let offset = nonce.len() - 8;
        for (n, s) in nonce[offset..].iter_mut().zip(seq_no.to_be_bytes()) {
            *n ^= s;
        }
        nonce
    }
}

impl RecordCipher for Aead13Cipher {
    fn ciphertext_limit(&self, plaintext_limit: usize) -> usize {
        plaintext_limit + 256
    }

    fn write_overhead(&self) -> usize {
        1 + self.cipher.tag_len()
    }

    fn encode_plaintext(
        &mut self,
        seq_no: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let mut data = Vec::with_capacity(plaintext.len() + 1 + self.cipher.tag_len());
        data.extend_from_slice(plaintext);
        data.push(content_type.as_u8());

        let sealed_len = data.len() + self.cipher.tag_len();
        let mut aad = [0x17, 0x03, 0x03, 0, 0];
        aad[3..].copy_from_slice(&(sealed_len as u16).to_be_bytes());

        let nonce = self.nonce(seq_no);
        self.cipher
            .encrypt(&mut data, &aad, &nonce)
            .map_err(Error::CryptoError)?;
        Ok((ContentType::ApplicationData, data))
    }

    fn decode_ciphertext(
        &mut self,
        seq_no: u64,
        record_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        if record_type != ContentType::ApplicationData {
            return Err(Error::UnexpectedMessage(format!(
                "{:?} record under TLS 1.3 protection",
                record_type
            )));
        }
        if ciphertext.len() < self.cipher.tag_len() {
            return Err(Error::BadRecordMac);
        }

        let mut aad = [record_type.as_u8(), 0, 0, 0, 0];
        aad[1..3].copy_from_slice(&version.as_u16().to_be_bytes());
        aad[3..].copy_from_slice(&(ciphertext.len() as u16).to_be_bytes());

        let nonce = self.nonce(seq_no);
        let mut data = ciphertext.to_vec();
        self.cipher
            .decrypt(&mut data, &aad, &nonce)
            .map_err(|_| Error::BadRecordMac)?;

        // Strip zero padding, the last non-zero byte is the real type.
        let Some(end) = data.iter().rposition(|b| *b != 0) else {
            return Err(Error::UnexpectedMessage(
                "TLS 1.3 record without content type".into(),
            ));
        };
        let content_type = ContentType::from_u8(data[end]);
        data.truncate(end);
        Ok((content_type, data))
    }

    fn rekey(&mut self) -> Result<(), Error> {
        let next = self
            .provider
            .hkdf_provider
            .hkdf_expand_label(self.hash, &self.secret, b"traffic upd", &[], self.hash.output_len())
            .map_err(Error::CryptoError)?;
        let (cipher, iv) = Self::derive(&self.provider, self.suite, self.hash, &next)?;
        self.secret = next;
        self.cipher = cipher;
        self.iv = iv;
        Ok(())
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;
    use crate::types::CipherSuite;

    fn suite(s: CipherSuite) -> &'static dyn SupportedCipherSuite {
        rust_crypto::default_provider().find_cipher_suite(s).unwrap()
    }

    #[test]
    fn aead12_explicit_nonce_and_tamper() {
        let s = suite(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256);
        let mut writer =
            Aead12Cipher::new(s.create_cipher(&[7; 16]).unwrap(), &[1, 2, 3, 4]).unwrap();
        let mut reader =
            Aead12Cipher::new(s.create_cipher(&[7; 16]).unwrap(), &[1, 2, 3, 4]).unwrap();

        let v = ProtocolVersion::TLSV1_2;
        let (_, sealed) = writer
            .encode_plaintext(5, ContentType::ApplicationData, v, b"hello")
            .unwrap();
        assert_eq!(&sealed[..8], &5_u64.to_be_bytes());
        assert_eq!(sealed.len(), 8 + 5 + 16);

        let (ct, plain) = reader
            .decode_ciphertext(5, ContentType::ApplicationData, v, &sealed)
            .unwrap();
        assert_eq!(ct, ContentType::ApplicationData);
        assert_eq!(plain, b"hello");

        // Wrong sequence number changes the AAD.
        let r = reader.decode_ciphertext(6, ContentType::ApplicationData, v, &sealed);
        assert!(matches!(r, Err(Error::BadRecordMac)));
    }

    #[test]
    fn cbc_roundtrip_both_iv_modes() {
        let provider = rust_crypto::default_provider();
        let s = suite(CipherSuite::RSA_AES128_CBC_SHA);
        let mac_key = || Secret::new(vec![9; 20]);

        for chained in [None, Some(vec![3; 16])] {
            let mut writer = CbcCipher::new(
                &provider,
                s.create_block_cipher(&[4; 16]).unwrap(),
                mac_key(),
                HashAlgorithm::SHA1,
                chained.clone(),
            );
            let mut reader = CbcCipher::new(
                &provider,
                s.create_block_cipher(&[4; 16]).unwrap(),
                mac_key(),
                HashAlgorithm::SHA1,
                chained,
            );
            let v = ProtocolVersion::TLSV1_1;
            for (seq, msg) in [&b"first"[..], &[0xAB; 100][..]].iter().enumerate() {
                let (_, sealed) = writer
                    .encode_plaintext(seq as u64, ContentType::Handshake, v, msg)
                    .unwrap();
                assert_eq!(sealed.len() % 16, 0);
                let (_, plain) = reader
                    .decode_ciphertext(seq as u64, ContentType::Handshake, v, &sealed)
                    .unwrap();
                assert_eq!(&plain, msg);
            }
        }
    }

    #[test]
    fn aead13_hides_content_type_and_rekeys() {
        let provider = rust_crypto::default_provider();
        let s = suite(CipherSuite::TLS13_AES_128_GCM_SHA256);
        let secret = || Secret::new(vec![0x42; 32]);
        let mut writer = Aead13Cipher::new(&provider, s, HashAlgorithm::SHA256, secret()).unwrap();
        let mut reader = Aead13Cipher::new(&provider, s, HashAlgorithm::SHA256, secret()).unwrap();
        let v = ProtocolVersion::TLSV1_2;

        let (outer, sealed) = writer
            .encode_plaintext(0, ContentType::Handshake, v, b"finished")
            .unwrap();
        assert_eq!(outer, ContentType::ApplicationData);
        let (inner, plain) = reader
            .decode_ciphertext(0, outer, v, &sealed)
            .unwrap();
        assert_eq!(inner, ContentType::Handshake);
        assert_eq!(plain, b"finished");

        writer.rekey().unwrap();
        let (_, sealed) = writer
            .encode_plaintext(0, ContentType::ApplicationData, v, b"data")
            .unwrap();
        assert!(reader.decode_ciphertext(0, outer, v, &sealed).is_err());
        reader.rekey().unwrap();
        let (_, plain) = reader.decode_ciphertext(0, outer, v, &sealed).unwrap();
        assert_eq!(plain, b"data");
    }
}
