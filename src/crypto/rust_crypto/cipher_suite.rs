//! Cipher suite implementations using RustCrypto.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes_gcm::aes::{Aes128, Aes256, Block};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Key, Nonce};

use crate::crypto::provider::{BlockCipher, Cipher, SupportedCipherSuite};
use crate::types::CipherSuite;

/// AES-GCM cipher implementation using RustCrypto.
enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesGcm::Aes128(_) => f.debug_tuple("AesGcm::Aes128").finish(),
            AesGcm::Aes256(_) => f.debug_tuple("AesGcm::Aes256").finish(),
        }
    }
}

impl AesGcm {
    fn new(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => {
                let key = Key::<Aes128Gcm>::from_slice(key);
                Ok(AesGcm::Aes128(Box::new(Aes128Gcm::new(key))))
            }
            32 => {
                let key = Key::<Aes256Gcm>::from_slice(key);
                Ok(AesGcm::Aes256(Box::new(Aes256Gcm::new(key))))
            }
            _ => Err(format!("Invalid key size for AES-GCM: {}", key.len())),
        }
    }
}

fn gcm_nonce(nonce: &[u8]) -> Result<&Nonce<aes_gcm::aead::consts::U12>, String> {
    if nonce.len() != 12 {
        return Err(format!(
            "Invalid nonce length: expected 12, got {}",
            nonce.len()
        ));
    }
    Ok(Nonce::from_slice(nonce))
}

impl Cipher for AesGcm {
    fn encrypt(&mut self, data: &mut Vec<u8>, aad: &[u8], nonce: &[u8]) -> Result<(), String> {
        let nonce = gcm_nonce(nonce)?;
        let result = match self {
            AesGcm::Aes128(cipher) => cipher.encrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.encrypt_in_place(nonce, aad, data),
        };
        result.map_err(|_| "AES-GCM encryption failed".to_string())
    }

    fn decrypt(&mut self, data: &mut Vec<u8>, aad: &[u8], nonce: &[u8]) -> Result<(), String> {
        if data.len() < 16 {
            return Err(format!("Ciphertext too short: {}", data.len()));
        }
        let nonce = gcm_nonce(nonce)?;
        // decrypt_in_place strips the tag
        let result = match self {
            AesGcm::Aes128(cipher) => cipher.decrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.decrypt_in_place(nonce, aad, data),
        };
        result.map_err(|_| "AES-GCM decryption failed".to_string())
    }
}

/// AES block cipher for the CBC suites.
enum AesCbc {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl std::fmt::Debug for AesCbc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesCbc::Aes128(_) => f.debug_tuple("AesCbc::Aes128").finish(),
            AesCbc::Aes256(_) => f.debug_tuple("AesCbc::Aes256").finish(),
        }
    }
}

impl AesCbc {
    fn new(key: &[u8]) -> Result<Self, String> {
        let invalid = |_| format!("Invalid key size for AES-CBC: {}", key.len());
        match key.len() {
            16 => Ok(AesCbc::Aes128(Box::new(
                Aes128::new_from_slice(key).map_err(invalid)?,
            ))),
            32 => Ok(AesCbc::Aes256(Box::new(
                Aes256::new_from_slice(key).map_err(invalid)?,
            ))),
            _ => Err(format!("Invalid key size for AES-CBC: {}", key.len())),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            AesCbc::Aes128(c) => c.encrypt_block(block),
            AesCbc::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            AesCbc::Aes128(c) => c.decrypt_block(block),
            AesCbc::Aes256(c) => c.decrypt_block(block),
        }
    }
}

fn check_cbc_input(iv: &[u8], data: &[u8]) -> Result<(), String> {
    if iv.len() != 16 {
        return Err(format!("Invalid CBC IV length: {}", iv.len()));
    }
    if data.len() % 16 != 0 {
        return Err(format!("CBC input not block aligned: {}", data.len()));
    }
    Ok(())
}

impl BlockCipher for AesCbc {
    fn cbc_encrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String> {
        check_cbc_input(iv, data)?;
        let mut prev = [0; 16];
        prev.copy_from_slice(iv);
        for chunk in data.chunks_exact_mut(16) {
            for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            self.encrypt_block(Block::from_mut_slice(chunk));
            prev.copy_from_slice(chunk);
        }
        Ok(())
    }

    fn cbc_decrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String> {
        check_cbc_input(iv, data)?;
        let mut prev = [0; 16];
        prev.copy_from_slice(iv);
        for chunk in data.chunks_exact_mut(16) {
            let mut current = [0; 16];
            current.copy_from_slice(chunk);
            self.decrypt_block(Block::from_mut_slice(chunk));
            for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            prev = current;
        }
        Ok(())
    }
}

/// An AES-GCM suite. TLS 1.2 suites use a 4 byte implicit IV, TLS 1.3
/// suites a 12 byte one.
#[derive(Debug)]
struct GcmSuite {
    suite: CipherSuite,
    key_len: usize,
}

impl SupportedCipherSuite for GcmSuite {
    fn suite(&self) -> CipherSuite {
        self.suite
    }

    fn key_lengths(&self) -> (usize, usize, usize) {
        let iv_len = if self.suite.is_tls13() { 12 } else { 4 };
        (0, self.key_len, iv_len)
    }

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Ok(Box::new(AesGcm::new(key)?))
    }
}

/// An AES-CBC suite with HMAC-SHA1.
#[derive(Debug)]
struct CbcSuite {
    suite: CipherSuite,
    key_len: usize,
}

impl SupportedCipherSuite for CbcSuite {
    fn suite(&self) -> CipherSuite {
        self.suite
    }

    fn key_lengths(&self) -> (usize, usize, usize) {
        (20, self.key_len, 16)
    }

    fn create_cipher(&self, _key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Err(format!("{:?} is not an AEAD suite", self.suite))
    }

    fn create_block_cipher(&self, key: &[u8]) -> Result<Box<dyn BlockCipher>, String> {
        Ok(Box::new(AesCbc::new(key)?))
    }
}

macro_rules! gcm {
    ($name:ident, $suite:ident, $len:expr) => {
        static $name: GcmSuite = GcmSuite {
            suite: CipherSuite::$suite,
            key_len: $len,
        };
    };
}

macro_rules! cbc {
    ($name:ident, $suite:ident, $len:expr) => {
        static $name: CbcSuite = CbcSuite {
            suite: CipherSuite::$suite,
            key_len: $len,
        };
    };
}

gcm!(TLS13_AES_128_GCM_SHA256, TLS13_AES_128_GCM_SHA256, 16);
gcm!(TLS13_AES_256_GCM_SHA384, TLS13_AES_256_GCM_SHA384, 32);
gcm!(ECDHE_ECDSA_AES128_GCM_SHA256, ECDHE_ECDSA_AES128_GCM_SHA256, 16);
gcm!(ECDHE_ECDSA_AES256_GCM_SHA384, ECDHE_ECDSA_AES256_GCM_SHA384, 32);
gcm!(ECDHE_RSA_AES128_GCM_SHA256, ECDHE_RSA_AES128_GCM_SHA256, 16);
gcm!(ECDHE_RSA_AES256_GCM_SHA384, ECDHE_RSA_AES256_GCM_SHA384, 32);
gcm!(RSA_AES128_GCM_SHA256, RSA_AES128_GCM_SHA256, 16);
gcm!(RSA_AES256_GCM_SHA384, RSA_AES256_GCM_SHA384, 32);
gcm!(DH_ANON_AES128_GCM_SHA256, DH_ANON_AES128_GCM_SHA256, 16);
gcm!(DH_ANON_AES256_GCM_SHA384, DH_ANON_AES256_GCM_SHA384, 32);
gcm!(PSK_AES128_GCM_SHA256, PSK_AES128_GCM_SHA256, 16);
gcm!(PSK_AES256_GCM_SHA384, PSK_AES256_GCM_SHA384, 32);
cbc!(ECDHE_ECDSA_AES128_CBC_SHA, ECDHE_ECDSA_AES128_CBC_SHA, 16);
cbc!(ECDHE_ECDSA_AES256_CBC_SHA, ECDHE_ECDSA_AES256_CBC_SHA, 32);
cbc!(ECDHE_RSA_AES128_CBC_SHA, ECDHE_RSA_AES128_CBC_SHA, 16);
cbc!(ECDHE_RSA_AES256_CBC_SHA, ECDHE_RSA_AES256_CBC_SHA, 32);
cbc!(RSA_AES128_CBC_SHA, RSA_AES128_CBC_SHA, 16);
cbc!(RSA_AES256_CBC_SHA, RSA_AES256_CBC_SHA, 32);
cbc!(SRP_SHA_AES128_CBC_SHA, SRP_SHA_AES128_CBC_SHA, 16);
cbc!(SRP_SHA_AES256_CBC_SHA, SRP_SHA_AES256_CBC_SHA, 32);

/// All supported cipher suites, in preference order.
pub(super) static ALL_CIPHER_SUITES: &[&dyn SupportedCipherSuite] = &[
    &TLS13_AES_128_GCM_SHA256,
    &TLS13_AES_256_GCM_SHA384,
    &ECDHE_ECDSA_AES128_GCM_SHA256,
    &ECDHE_ECDSA_AES256_GCM_SHA384,
    &ECDHE_RSA_AES128_GCM_SHA256,
    &ECDHE_RSA_AES256_GCM_SHA384,
    &RSA_AES128_GCM_SHA256,
    &RSA_AES256_GCM_SHA384,
    &ECDHE_ECDSA_AES128_CBC_SHA,
    &ECDHE_ECDSA_AES256_CBC_SHA,
    &ECDHE_RSA_AES128_CBC_SHA,
    &ECDHE_RSA_AES256_CBC_SHA,
    &RSA_AES128_CBC_SHA,
    &RSA_AES256_CBC_SHA,
    &PSK_AES128_GCM_SHA256,
    &PSK_AES256_GCM_SHA384,
    &SRP_SHA_AES128_CBC_SHA,
    &SRP_SHA_AES256_CBC_SHA,
    &DH_ANON_AES128_GCM_SHA256,
    &DH_ANON_AES256_GCM_SHA384,
];
