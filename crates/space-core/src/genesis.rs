//! Space genesis (§3 "SpaceGenesis")

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::{b64_decode, b64_encode, KeyPair};
use crate::error::{Error, Result};
use crate::identifiers::{id_from_spki, verify_id_from_spki};

/// `{space_id, space_root_pub, created_ts, name?}` signed by the Space Root
/// key. Founds a Space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceGenesis {
    pub v: u64,
    pub space_id: String,
    pub space_root_pub: String,
    pub created_ts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub sig: String,
}

impl SpaceGenesis {
    /// Sign a new genesis under the Space Root key.
    pub fn new(space_root: &KeyPair, created_ts: u64, name: Option<String>) -> Self {
        let space_root_pub = space_root.public_key();
        let space_id = id_from_spki(&space_root_pub);
        let sig_input = canonical::space_genesis_sig_input(
            1,
            &space_id,
            &space_root_pub,
            created_ts,
            name.as_deref(),
        );
        let sig = space_root.sign(&sig_input);
        Self {
            v: 1,
            space_id,
            space_root_pub: b64_encode(&space_root_pub),
            created_ts,
            name,
            sig: b64_encode(&sig),
        }
    }

    pub fn space_root_pub_bytes(&self) -> Result<[u8; 32]> {
        let bytes = b64_decode(&self.space_root_pub)?;
        bytes
            .try_into()
            .map_err(|_| Error::InvalidPublicKey("expected 32-byte space root key".into()))
    }

    fn sig_input(&self) -> Result<Vec<u8>> {
        Ok(canonical::space_genesis_sig_input(
            self.v,
            &self.space_id,
            &self.space_root_pub_bytes()?,
            self.created_ts,
            self.name.as_deref(),
        ))
    }

    /// `space_id == id_from_spki(space_root_pub)` and the signature verifies.
    pub fn verify(&self) -> Result<()> {
        let space_root_pub = self.space_root_pub_bytes()?;
        verify_id_from_spki(&self.space_id, &space_root_pub)?;
        let sig_input = self.sig_input()?;
        let sig = b64_decode(&self.sig)?;
        KeyPair::verify(&space_root_pub, &sig_input, &sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_round_trip_verifies() {
        let root = KeyPair::generate();
        let genesis = SpaceGenesis::new(&root, 1_000, Some("test".into()));
        assert!(genesis.verify().is_ok());
        assert!(genesis.space_id.starts_with("ed25519:"));
    }

    #[test]
    fn genesis_rejects_mismatched_space_id() {
        let root = KeyPair::generate();
        let mut genesis = SpaceGenesis::new(&root, 1_000, None);
        genesis.space_id = "ed25519:bogus".into();
        assert!(genesis.verify().is_err());
    }

    #[test]
    fn genesis_rejects_tampered_name() {
        let root = KeyPair::generate();
        let mut genesis = SpaceGenesis::new(&root, 1_000, Some("test".into()));
        genesis.name = Some("tampered".into());
        assert!(genesis.verify().is_err());
    }
}
