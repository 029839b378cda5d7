//! Cryptographic primitives (§4.2)
//!
//! Ed25519 sign/verify over raw 32-byte public keys, SHA-256 for content
//! addressing, and the two base64 variants the wire format uses: standard
//! (padded) for key/signature material embedded in JSON, and
//! base64url-nopad for hash-derived identifiers.

use crate::error::{Error, Result};
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Fixed 12-byte DER prefix for an Ed25519 SubjectPublicKeyInfo. Followed by
/// the raw 32-byte public key, for 44 bytes total (§3 "Identifiers").
pub const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Total length of an Ed25519 SPKI DER encoding.
pub const SPKI_ED25519_LEN: usize = 44;

/// Wrap a raw Ed25519 public key in its fixed SPKI DER encoding.
pub fn spki_der(pubkey: &[u8; 32]) -> [u8; SPKI_ED25519_LEN] {
    let mut out = [0u8; SPKI_ED25519_LEN];
    out[..12].copy_from_slice(&SPKI_ED25519_PREFIX);
    out[12..].copy_from_slice(pubkey);
    out
}

/// Parse an SPKI DER encoding back to a raw Ed25519 public key.
pub fn parse_spki_der(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() != SPKI_ED25519_LEN || bytes[..12] != SPKI_ED25519_PREFIX {
        return Err(Error::InvalidPublicKey(
            "not a 44-byte Ed25519 SPKI encoding".into(),
        ));
    }
    let mut pk = [0u8; 32];
    pk.copy_from_slice(&bytes[12..]);
    Ok(pk)
}

/// SHA-256 digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Encode with standard (padded) base64, used for key/signature material in
/// JSON documents.
pub fn b64_encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard (padded) base64.
pub fn b64_decode(s: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::Base64(e.to_string()))
}

/// Encode with unpadded base64url, used for hash-derived identifiers.
pub fn b64url_encode(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::Base64(e.to_string()))
}

/// An Ed25519 keypair. Used for Principal, Device, Space Root, and any other
/// role that signs protocol objects.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Reconstruct a keypair from a 32-byte seed (deterministic, for tests
    /// and for restoring a persisted identity).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Generate a keypair from the injected CSPRNG (§9 "the core consumes
    /// ... a CSPRNG"), rather than reaching for a global RNG.
    pub fn from_csprng(rng: &mut dyn crate::clock::Csprng) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// The 32-byte seed, for persistence. Callers must protect this like any
    /// other private key material.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `message`, returning a raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify `signature` over `message` under `public_key`.
    pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| Error::InvalidSignatureEncoding("expected 64 bytes".into()))?;
        let sig = Signature::from_bytes(&sig_bytes);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| Error::InvalidSignature)
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.seed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spki_roundtrip() {
        let kp = KeyPair::generate();
        let der = spki_der(&kp.public_key());
        assert_eq!(der.len(), SPKI_ED25519_LEN);
        let recovered = parse_spki_der(&der).unwrap();
        assert_eq!(recovered, kp.public_key());
    }

    #[test]
    fn spki_rejects_bad_prefix() {
        let mut der = spki_der(&[0u8; 32]);
        der[0] = 0xff;
        assert!(parse_spki_der(&der).is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let kp = KeyPair::generate();
        let msg = b"hello p2pspace";
        let sig = kp.sign(msg);
        assert!(KeyPair::verify(&kp.public_key(), msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(KeyPair::verify(&kp.public_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn base64_variants_roundtrip() {
        let bytes = sha256(b"some data");
        let padded = b64_encode(&bytes);
        assert!(padded.ends_with('=') || padded.len() % 4 == 0);
        assert_eq!(b64_decode(&padded).unwrap(), bytes);

        let urlsafe = b64url_encode(&bytes);
        assert!(!urlsafe.contains('='));
        assert!(!urlsafe.contains('+') && !urlsafe.contains('/'));
        assert_eq!(b64url_decode(&urlsafe).unwrap(), bytes);
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"x"), sha256(b"x"));
        assert_ne!(sha256(b"x"), sha256(b"y"));
    }
}
