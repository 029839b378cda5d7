//! Event model (§3 "Event", §4.5)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::clock::Clock;
use crate::crypto::{b64_decode, b64_encode, KeyPair};
use crate::error::{Error, Result};
use crate::identifiers::{event_id_from_sig_input, verify_id_from_spki};
use crate::identity::Identity;

/// Author parent-selection cap (§4.5 "up to 8 current heads").
pub const MAX_PARENTS_PER_EVENT: usize = 8;

/// `{v=1, space_id, room_id, event_id, author_*, delegation, ts, kind,
/// prev[], body, sig}` (§3 "Event").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub v: u64,
    pub space_id: String,
    pub room_id: String,
    pub event_id: String,
    pub author_principal_id: String,
    pub author_device_id: String,
    pub author_device_pub: String,
    pub delegation: crate::identity::DelegationCert,
    pub ts: u64,
    pub kind: String,
    pub prev: Vec<String>,
    pub body: Value,
    pub sig: String,
}

/// Sort and cap a head set to the author-side parent-selection policy.
pub fn select_parents(mut heads: Vec<String>) -> Vec<String> {
    heads.sort();
    heads.truncate(MAX_PARENTS_PER_EVENT);
    heads
}

impl Event {
    /// Author a new event: selects up to 8 sorted parents, signs with the
    /// Device key, and derives `event_id` from the signature input.
    pub fn create(
        identity: &mut Identity,
        space_id: &str,
        room_id: &str,
        kind: &str,
        body: Value,
        prev_heads: Vec<String>,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let prev = select_parents(prev_heads);
        let delegation = identity.ensure_delegation_for_space(space_id, clock).clone();
        let ts = clock.now_ms();
        let author_device_pub = identity.device().public_key();
        let body_jcs = crate::jcs::to_vec(&body)?;

        let sig_input = canonical::event_sig_input(
            1,
            space_id,
            room_id,
            &identity.principal_id,
            &identity.device_id,
            &author_device_pub,
            &delegation.sig_bytes()?,
            ts,
            kind,
            &prev,
            &body_jcs,
        );
        let event_id = event_id_from_sig_input(&sig_input);
        let sig = identity.device().sign(&sig_input);

        Ok(Self {
            v: 1,
            space_id: space_id.to_string(),
            room_id: room_id.to_string(),
            event_id,
            author_principal_id: identity.principal_id.clone(),
            author_device_id: identity.device_id.clone(),
            author_device_pub: b64_encode(&author_device_pub),
            delegation,
            ts,
            kind: kind.to_string(),
            prev,
            body,
            sig: b64_encode(&sig),
        })
    }

    fn author_device_pub_bytes(&self) -> Result<[u8; 32]> {
        let bytes = b64_decode(&self.author_device_pub)?;
        bytes
            .try_into()
            .map_err(|_| Error::InvalidPublicKey("expected 32-byte device key".into()))
    }

    fn sig_input(&self) -> Result<Vec<u8>> {
        let body_jcs = crate::jcs::to_vec(&self.body)?;
        Ok(canonical::event_sig_input(
            self.v,
            &self.space_id,
            &self.room_id,
            &self.author_principal_id,
            &self.author_device_id,
            &self.author_device_pub_bytes()?,
            &self.delegation.sig_bytes()?,
            self.ts,
            &self.kind,
            &self.prev,
            &body_jcs,
        ))
    }

    /// Invariant 1 (§3): identities recompute, `event_id` recomputes, and
    /// the signature verifies. Does not check the delegation's validity
    /// window or authorization — that is the acceptance pipeline's job.
    pub fn verify(&self) -> Result<()> {
        let author_device_pub = self.author_device_pub_bytes()?;
        verify_id_from_spki(&self.author_device_id, &author_device_pub)?;
        if self.delegation.device_id != self.author_device_id
            || self.delegation.principal_id != self.author_principal_id
        {
            return Err(Error::InvalidIdentifier(
                "event delegation does not match author ids".into(),
            ));
        }

        let sig_input = self.sig_input()?;
        let expected_id = event_id_from_sig_input(&sig_input);
        if expected_id != self.event_id {
            return Err(Error::IdMismatch {
                computed: expected_id,
                transmitted: self.event_id.clone(),
            });
        }

        let sig = b64_decode(&self.sig)?;
        KeyPair::verify(&author_device_pub, &sig_input, &sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TestCsprng};
    use serde_json::json;

    fn identity() -> Identity {
        let mut rng = TestCsprng::new(5);
        Identity::create(&mut rng)
    }

    #[test]
    fn event_self_validates() {
        let mut id = identity();
        let clock = FixedClock(1_000);
        let e = Event::create(&mut id, "space1", "general", "MSG_POST", json!({"text":"hi"}), vec![], &clock).unwrap();
        assert!(e.verify().is_ok());
        assert!(e.event_id.starts_with("e:"));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut id = identity();
        let clock = FixedClock(1_000);
        let mut e = Event::create(&mut id, "space1", "general", "MSG_POST", json!({"text":"hi"}), vec![], &clock).unwrap();
        e.body = json!({"text": "tampered"});
        assert!(e.verify().is_err());
    }

    #[test]
    fn parent_selection_sorts_and_caps_at_eight() {
        let heads: Vec<String> = (0..12).map(|i| format!("e:{i:02}")).collect();
        let selected = select_parents(heads);
        assert_eq!(selected.len(), MAX_PARENTS_PER_EVENT);
        let mut sorted = selected.clone();
        sorted.sort();
        assert_eq!(selected, sorted);
    }

    #[test]
    fn prev_order_is_significant_to_the_signature() {
        let mut id = identity();
        let clock = FixedClock(2_000);
        let a = Event::create(&mut id, "space1", "general", "MSG_POST", json!({}), vec!["e:aaa".into()], &clock).unwrap();
        let b = Event::create(&mut id, "space1", "general", "MSG_POST", json!({}), vec!["e:bbb".into()], &clock).unwrap();
        assert_ne!(a.event_id, b.event_id);
    }
}
