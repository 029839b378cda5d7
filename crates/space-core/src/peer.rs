//! Signed peer record (§6 "Peer record")
//!
//! Not a network connection handle — a small signed document a Device can
//! publish through the bootstrap/rendezvous channel so other Devices can
//! find it without a central directory. `addrs` is the same kind of opaque
//! JCS sub-object as `Invite.bootstrap`: transports interpret its contents,
//! this module only signs and verifies the envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::crypto::{b64_decode, b64_encode, KeyPair};
use crate::error::Result;
use crate::identifiers::verify_id_from_spki;
use crate::identity::DelegationCert;

/// A Device's self-published address/rendezvous record, signed by the
/// Device key and anchored to its Principal via `delegation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub v: u64,
    pub principal_id: String,
    pub principal_pub: String,
    pub device_id: String,
    pub device_pub: String,
    pub delegation: DelegationCert,
    pub ts: u64,
    pub expires_ts: u64,
    #[serde(default = "empty_object")]
    pub addrs: Value,
    pub sig: String,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl PeerRecord {
    /// Sign a fresh record under the Device key.
    pub fn new(
        principal_pub: &[u8; 32],
        principal_id: &str,
        device: &KeyPair,
        device_id: &str,
        delegation: DelegationCert,
        ts: u64,
        expires_ts: u64,
        addrs: Value,
    ) -> Result<Self> {
        let device_pub = device.public_key();
        let addrs_jcs = crate::jcs::to_vec(&addrs)?;
        let sig_input = canonical::peer_sig_input(
            1,
            principal_id,
            principal_pub,
            device_id,
            &device_pub,
            &delegation.sig_bytes()?,
            ts,
            expires_ts,
            &addrs_jcs,
        );
        let sig = device.sign(&sig_input);
        Ok(Self {
            v: 1,
            principal_id: principal_id.to_string(),
            principal_pub: b64_encode(principal_pub),
            device_id: device_id.to_string(),
            device_pub: b64_encode(&device_pub),
            delegation,
            ts,
            expires_ts,
            addrs,
            sig: b64_encode(&sig),
        })
    }

    fn principal_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pubkey(&self.principal_pub)
    }

    fn device_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_pubkey(&self.device_pub)
    }

    pub fn sig_input(&self) -> Result<Vec<u8>> {
        let addrs_jcs = crate::jcs::to_vec(&self.addrs)?;
        Ok(canonical::peer_sig_input(
            self.v,
            &self.principal_id,
            &self.principal_pub_bytes()?,
            &self.device_id,
            &self.device_pub_bytes()?,
            &self.delegation.sig_bytes()?,
            self.ts,
            self.expires_ts,
            &addrs_jcs,
        ))
    }

    /// Identities recompute, `delegation` matches this record's identities
    /// and verifies, and the device signature verifies. Expiry is a plain
    /// `now_ms <= expires_ts` check — no skew: stale bootstrap hints are
    /// harmless to discard a little early.
    pub fn verify(&self, now_ms: u64) -> Result<()> {
        let principal_pub = self.principal_pub_bytes()?;
        let device_pub = self.device_pub_bytes()?;
        verify_id_from_spki(&self.principal_id, &principal_pub)?;
        verify_id_from_spki(&self.device_id, &device_pub)?;

        if self.delegation.principal_id != self.principal_id
            || self.delegation.device_id != self.device_id
        {
            return Err(crate::error::Error::InvalidIdentifier(
                "peer record delegation does not match its own identities".into(),
            ));
        }
        self.delegation.verify(now_ms)?;

        if now_ms > self.expires_ts {
            return Err(crate::error::Error::InvalidIdentifier(format!(
                "peer record expired at {}",
                self.expires_ts
            )));
        }

        let sig_input = self.sig_input()?;
        let sig = b64_decode(&self.sig)?;
        KeyPair::verify(&device_pub, &sig_input, &sig)
    }
}

fn decode_pubkey(s: &str) -> Result<[u8; 32]> {
    let bytes = b64_decode(s)?;
    bytes
        .try_into()
        .map_err(|_| crate::error::Error::InvalidPublicKey("expected 32-byte public key".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TestCsprng};
    use crate::identity::Identity;
    use serde_json::json;

    #[test]
    fn peer_record_round_trip_verifies() {
        let mut rng = TestCsprng::new(7);
        let mut identity = Identity::create(&mut rng);
        let clock = FixedClock(1_000_000);
        let delegation = identity
            .ensure_delegation_for_space("space1", &clock)
            .clone();

        let record = PeerRecord::new(
            &identity.principal().public_key(),
            &identity.principal_id,
            identity.device(),
            &identity.device_id,
            delegation,
            1_000_000,
            2_000_000,
            json!({"relays": ["wss://relay.example"]}),
        )
        .unwrap();

        assert!(record.verify(1_500_000).is_ok());
    }

    #[test]
    fn peer_record_rejects_after_expiry() {
        let mut rng = TestCsprng::new(8);
        let mut identity = Identity::create(&mut rng);
        let clock = FixedClock(1_000_000);
        let delegation = identity
            .ensure_delegation_for_space("space1", &clock)
            .clone();

        let record = PeerRecord::new(
            &identity.principal().public_key(),
            &identity.principal_id,
            identity.device(),
            &identity.device_id,
            delegation,
            1_000_000,
            2_000_000,
            json!({}),
        )
        .unwrap();

        assert!(record.verify(2_000_001).is_err());
    }

    #[test]
    fn peer_record_rejects_tampered_addrs() {
        let mut rng = TestCsprng::new(9);
        let mut identity = Identity::create(&mut rng);
        let clock = FixedClock(1_000_000);
        let delegation = identity
            .ensure_delegation_for_space("space1", &clock)
            .clone();

        let mut record = PeerRecord::new(
            &identity.principal().public_key(),
            &identity.principal_id,
            identity.device(),
            &identity.device_id,
            delegation,
            1_000_000,
            2_000_000,
            json!({"relays": ["wss://a"]}),
        )
        .unwrap();

        record.addrs = json!({"relays": ["wss://evil"]});
        assert!(record.verify(1_500_000).is_err());
    }
}
