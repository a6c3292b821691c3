// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RSA primitives shared by poll signing keys and voter keys.
//!
//! Keys are stored as PEM text: PKCS#8 for private keys, SPKI for public
//! keys. Signatures are RSASSA-PKCS1-v1_5 over SHA-256, which is what
//! token bundles and anonymous vote signatures carry on the wire.

use rand::{rngs::OsRng, RngCore};
use rsa::{
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{RandomizedSigner, SignatureEncoding, Verifier},
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};

/// Modulus size for every generated key.
pub const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("private key encoding error: {0}")]
    PrivateKey(#[from] rsa::pkcs8::Error),

    #[error("public key encoding error: {0}")]
    PublicKey(#[from] rsa::pkcs8::spki::Error),

    #[error("signature error: {0}")]
    Signature(#[from] rsa::signature::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// PEM-encoded RSA keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// PKCS#8 PEM private key.
    pub private_key_pem: String,
    /// SPKI PEM public key.
    pub public_key_pem: String,
}

impl KeyPair {
    /// Generate a fresh RSA-2048 keypair.
    ///
    /// This takes tens to hundreds of milliseconds; call it from blocking
    /// context when running inside the async runtime.
    pub fn generate() -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)?;
        let public_key = private_key.to_public_key();

        Ok(Self {
            private_key_pem: private_key.to_pkcs8_pem(LineEnding::LF)?.to_string(),
            public_key_pem: public_key.to_public_key_pem(LineEnding::LF)?,
        })
    }
}

/// Parse an SPKI PEM public key.
pub fn parse_public_key(public_key_pem: &str) -> CryptoResult<RsaPublicKey> {
    Ok(RsaPublicKey::from_public_key_pem(public_key_pem)?)
}

/// A parsed private key, reusable across many signatures.
pub struct PemSigner {
    key: SigningKey<Sha256>,
}

impl PemSigner {
    pub fn from_pkcs8_pem(private_key_pem: &str) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)?;
        Ok(Self {
            key: SigningKey::<Sha256>::new(private_key),
        })
    }

    pub fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        let signature = self.key.try_sign_with_rng(&mut OsRng, message)?;
        Ok(signature.to_vec())
    }
}

/// Sign `message` with a PKCS#8 PEM private key.
pub fn sign(private_key_pem: &str, message: &[u8]) -> CryptoResult<Vec<u8>> {
    PemSigner::from_pkcs8_pem(private_key_pem)?.sign(message)
}

/// Check `signature` over `message` against a parsed public key.
///
/// Malformed signatures verify as `false`.
pub fn verify(public_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(message, &signature)
        .is_ok()
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `len` random bytes from the OS RNG, hex encoded.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A keypair generated once per test binary; RSA generation is slow.
#[cfg(test)]
pub(crate) fn test_keypair() -> KeyPair {
    use std::sync::OnceLock;

    static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
    KEYPAIR
        .get_or_init(|| KeyPair::generate().expect("keygen"))
        .clone()
}
