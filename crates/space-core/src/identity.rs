//! Identity & delegation (§3, §4.3)
//!
//! A Principal is the long-lived root key; a Device is a per-installation
//! key authorized for a window of time and a set of scopes via a
//! [`DelegationCert`] the Principal signs.

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::clock::Clock;
use crate::crypto::{b64_decode, b64_encode, KeyPair};
use crate::error::{Error, Result};
use crate::identifiers::{id_from_spki, verify_id_from_spki};

/// Tolerance applied to every validity-window check in the protocol (§4.3).
pub const CLOCK_SKEW_MS: u64 = 10 * 60 * 1000;

/// Minimum remaining lifetime before a cached delegation is reused rather
/// than re-synthesized (§4.3 "reuses an unexpired delegation by at least
/// 1 minute").
const MIN_REMAINING_LIFETIME_MS: u64 = 60 * 1000;

/// Default delegation lifetime when synthesizing a fresh one.
const DELEGATION_LIFETIME_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Binds a Device to a Principal for a validity window and a set of scopes
/// (§3 "DelegationCert").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelegationCert {
    pub v: u64,
    pub principal_id: String,
    pub principal_pub: String,
    pub device_id: String,
    pub device_pub: String,
    pub not_before_ts: u64,
    pub expires_ts: u64,
    pub scopes: Vec<String>,
    pub sig: String,
}

impl DelegationCert {
    /// Sign a fresh delegation for `device_pub`/`device_id` under the
    /// Principal key.
    pub fn new(
        principal: &KeyPair,
        device_pub: &[u8; 32],
        not_before_ts: u64,
        expires_ts: u64,
        scopes: Vec<String>,
    ) -> Self {
        let principal_pub = principal.public_key();
        let principal_id = id_from_spki(&principal_pub);
        let device_id = id_from_spki(device_pub);
        let sig_input = canonical::delegation_sig_input(
            1,
            &principal_id,
            &principal_pub,
            &device_id,
            device_pub,
            not_before_ts,
            expires_ts,
            &scopes,
        );
        let sig = principal.sign(&sig_input);
        Self {
            v: 1,
            principal_id,
            principal_pub: b64_encode(&principal_pub),
            device_id,
            device_pub: b64_encode(device_pub),
            not_before_ts,
            expires_ts,
            scopes,
            sig: b64_encode(&sig),
        }
    }

    fn principal_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pubkey(&self.principal_pub)
    }

    fn device_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pubkey(&self.device_pub)
    }

    /// The bytes this certificate's `sig` is computed over.
    pub fn sig_input(&self) -> Result<Vec<u8>> {
        Ok(canonical::delegation_sig_input(
            self.v,
            &self.principal_id,
            &self.principal_pub_bytes()?,
            &self.device_id,
            &self.device_pub_bytes()?,
            self.not_before_ts,
            self.expires_ts,
            &self.scopes,
        ))
    }

    /// The raw signature bytes.
    pub fn sig_bytes(&self) -> Result<Vec<u8>> {
        b64_decode(&self.sig)
    }

    /// Full verification: identifiers recompute, signature verifies, and
    /// `now` falls within `[not_before_ts - skew, expires_ts + skew]`.
    pub fn verify(&self, now_ms: u64) -> Result<()> {
        let principal_pub = self.principal_pub_bytes()?;
        let device_pub = self.device_pub_bytes()?;
        verify_id_from_spki(&self.principal_id, &principal_pub)?;
        verify_id_from_spki(&self.device_id, &device_pub)?;

        let sig_input = self.sig_input()?;
        let sig = self.sig_bytes()?;
        KeyPair::verify(&principal_pub, &sig_input, &sig)?;

        if now_ms + CLOCK_SKEW_MS < self.not_before_ts || now_ms > self.expires_ts + CLOCK_SKEW_MS
        {
            return Err(Error::InvalidIdentifier(format!(
                "delegation window [{}, {}] does not cover {now_ms}",
                self.not_before_ts, self.expires_ts
            )));
        }
        Ok(())
    }

    /// Whether this delegation grants `scope` (exact string match, §3
    /// "space:<space_id>:{join,post,governance}").
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

fn decode_pubkey(s: &str) -> Result<[u8; 32]> {
    let bytes = b64_decode(s)?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidPublicKey("expected 32-byte public key".into()))
}

/// A user's Principal keypair plus one Device keypair and a cache of
/// per-Space delegations (§3 "Identity").
pub struct Identity {
    principal: KeyPair,
    pub principal_id: String,
    device: KeyPair,
    pub device_id: String,
    delegations: std::collections::HashMap<String, DelegationCert>,
}

impl Identity {
    /// Generate a fresh Principal and Device keypair from the injected
    /// CSPRNG.
    pub fn create(rng: &mut dyn crate::clock::Csprng) -> Self {
        let principal = KeyPair::from_csprng(rng);
        let device = KeyPair::from_csprng(rng);
        let principal_id = id_from_spki(&principal.public_key());
        let device_id = id_from_spki(&device.public_key());
        Self {
            principal,
            principal_id,
            device,
            device_id,
            delegations: std::collections::HashMap::new(),
        }
    }

    /// Restore an Identity from persisted keypairs (§9 persistence format).
    pub fn from_keys(principal: KeyPair, device: KeyPair) -> Self {
        let principal_id = id_from_spki(&principal.public_key());
        let device_id = id_from_spki(&device.public_key());
        Self {
            principal,
            principal_id,
            device,
            device_id,
            delegations: std::collections::HashMap::new(),
        }
    }

    pub fn principal(&self) -> &KeyPair {
        &self.principal
    }

    pub fn device(&self) -> &KeyPair {
        &self.device
    }

    /// Reuse a cached, unexpired-by-at-least-a-minute delegation for
    /// `space_id`, or synthesize and cache a fresh one (§4.3).
    pub fn ensure_delegation_for_space(
        &mut self,
        space_id: &str,
        clock: &dyn Clock,
    ) -> &DelegationCert {
        let now = clock.now_ms();
        let needs_fresh = match self.delegations.get(space_id) {
            Some(cert) => cert.expires_ts < now + MIN_REMAINING_LIFETIME_MS,
            None => true,
        };
        if needs_fresh {
            let scopes = vec![
                format!("space:{space_id}:join"),
                format!("space:{space_id}:post"),
                format!("space:{space_id}:governance"),
            ];
            let not_before_ts = now.saturating_sub(CLOCK_SKEW_MS);
            let expires_ts = now + DELEGATION_LIFETIME_MS;
            let cert = DelegationCert::new(
                &self.principal,
                &self.device.public_key(),
                not_before_ts,
                expires_ts,
                scopes,
            );
            self.delegations.insert(space_id.to_string(), cert);
        }
        self.delegations.get(space_id).expect("just inserted")
    }
}
