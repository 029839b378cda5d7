//! Identifier derivation (§3 "Identifiers")
//!
//! `principal_id` / `device_id` / `space_id` are all the same scheme:
//! `"ed25519:" + base64url-nopad(sha256(SPKI_DER(pk)))`. `event_id` is
//! derived the same way but from the event's signature input rather than a
//! public key, with an `"e:"` prefix instead of `"ed25519:"`.

use crate::crypto::{b64url_decode, b64url_encode, sha256, spki_der};
use crate::error::{Error, Result};

/// Prefix for principal/device/space identifiers.
pub const ED25519_ID_PREFIX: &str = "ed25519:";
/// Prefix for event identifiers.
pub const EVENT_ID_PREFIX: &str = "e:";

/// Derive `"ed25519:" + base64url(sha256(SPKI_DER(pk)))` from a raw public key.
pub fn id_from_spki(pubkey: &[u8; 32]) -> String {
    let der = spki_der(pubkey);
    let digest = sha256(&der);
    format!("{ED25519_ID_PREFIX}{}", b64url_encode(&digest))
}

/// Verify that `id` is the correctly-derived identifier for `pubkey`.
pub fn verify_id_from_spki(id: &str, pubkey: &[u8; 32]) -> Result<()> {
    let expected = id_from_spki(pubkey);
    if id != expected {
        return Err(Error::IdMismatch {
            computed: expected,
            transmitted: id.to_string(),
        });
    }
    Ok(())
}

/// Derive `"e:" + base64url(sha256(sig_input))` for an event.
pub fn event_id_from_sig_input(sig_input: &[u8]) -> String {
    let digest = sha256(sig_input);
    format!("{EVENT_ID_PREFIX}{}", b64url_encode(&digest))
}

/// Parse the raw 32-byte digest out of an `ed25519:`-prefixed or
/// `e:`-prefixed identifier, checking the prefix matches `expected_prefix`.
pub fn parse_id(id: &str, expected_prefix: &str) -> Result<[u8; 32]> {
    let rest = id.strip_prefix(expected_prefix).ok_or_else(|| {
        Error::InvalidIdentifier(format!("expected prefix {expected_prefix:?} in {id:?}"))
    })?;
    let bytes = b64url_decode(rest)?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidIdentifier(format!("expected 32-byte digest in {id:?}")))
}

/// Generate a 128-bit random invite id, base64url-nopad encoded.
pub fn generate_invite_id(rng: &mut dyn crate::clock::Csprng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    b64url_encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn id_from_spki_is_deterministic() {
        let kp = KeyPair::generate();
        let id1 = id_from_spki(&kp.public_key());
        let id2 = id_from_spki(&kp.public_key());
        assert_eq!(id1, id2);
        assert!(id1.starts_with("ed25519:"));
    }

    #[test]
    fn different_keys_different_ids() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(id_from_spki(&a.public_key()), id_from_spki(&b.public_key()));
    }

    #[test]
    fn verify_id_from_spki_detects_mismatch() {
        let kp = KeyPair::generate();
        let id = id_from_spki(&kp.public_key());
        assert!(verify_id_from_spki(&id, &kp.public_key()).is_ok());
        assert!(verify_id_from_spki("ed25519:not-real", &kp.public_key()).is_err());
    }

    #[test]
    fn event_id_prefix_and_determinism() {
        let id = event_id_from_sig_input(b"some sig input bytes");
        assert!(id.starts_with("e:"));
        assert_eq!(id, event_id_from_sig_input(b"some sig input bytes"));
    }
}
