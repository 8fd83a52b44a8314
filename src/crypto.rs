//! Keys, hashes and raw signatures

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::types::Hash;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::fmt;

pub use secp256k1::PublicKey;

/// A secp256k1 key pair. The secret half never leaves this type except
/// through [`Keypair::secret_bytes`].
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut secp256k1::rand::thread_rng());
        Self { secret, public }
    }

    /// Derive a key pair from arbitrary seed bytes: sk = SHA256(seed)
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let digest = Sha256::digest(seed);
        Self::from_secret_bytes(&digest)
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::Construction(format!("invalid secret key: {}", e)))?;
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Sign the double-SHA256 digest of `message`
    pub fn sign(&self, message: &[u8]) -> Signature {
        let secp = Secp256k1::signing_only();
        secp.sign_ecdsa(&signing_digest(message), &self.secret)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// SignDigest: 𝕊 → ℍ, sha256d(message)
pub fn signing_digest(message: &[u8]) -> Message {
    let hash = sha256d::Hash::hash(message);
    Message::from_digest(hash.into_inner())
}

/// Verify a compact ECDSA signature over `message`
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&signing_digest(message), signature, public_key).is_ok()
}

/// Fingerprint: HASH160(compressed public key) = RIPEMD160(SHA256(pk))
pub fn key_fingerprint(public_key: &PublicKey) -> [u8; FINGERPRINT_LEN] {
    let sha256_hash = Sha256::digest(public_key.serialize());
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    let mut fingerprint = [0u8; FINGERPRINT_LEN];
    fingerprint.copy_from_slice(&ripemd160_hash);
    fingerprint
}

/// Content hash used for transaction ids
pub fn content_hash(bytes: &[u8]) -> Hash {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(bytes));
    hash
}

pub fn signature_to_hex(signature: &Signature) -> String {
    hex::encode(signature.serialize_compact())
}

pub fn signature_from_hex(text: &str) -> Result<Signature> {
    let bytes = hex::decode(text)
        .map_err(|e| LedgerError::Signature(format!("signature is not hex: {}", e)))?;
    Signature::from_compact(&bytes)
        .map_err(|e| LedgerError::Signature(format!("malformed signature: {}", e)))
}

pub fn public_key_from_hex(text: &str) -> Result<PublicKey> {
    let bytes = hex::decode(text)
        .map_err(|e| LedgerError::Construction(format!("public key is not hex: {}", e)))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| LedgerError::Construction(format!("invalid public key: {}", e)))
}
