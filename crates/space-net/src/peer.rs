//! Peer identity and bootstrap records for the TCP transport
//!
//! `PeerId` is just a Device's protocol identifier (`ed25519:...`); there is
//! no separate transport-level key. `PeerInfo` is the ambient connection
//! record the transport keeps per known address, distinct from
//! [`space_core::peer::PeerRecord`] (the signed document a Device publishes
//! through the bootstrap channel) — `PeerInfo::from_record` builds one from
//! the other once the signature has been checked.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use space_core::peer::PeerRecord;

/// A Device's protocol identifier, used to key known and connected peers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self(device_id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the transport knows about a peer: its identity, the addresses its
/// `PeerRecord.addrs` or an `Invite.bootstrap` advertised, and when we last
/// heard from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<SocketAddr>,
    pub last_seen_ms: u64,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<SocketAddr>) -> Self {
        Self { id, addrs, last_seen_ms: 0 }
    }

    /// Build connection hints from a verified [`PeerRecord`]. `addrs` is
    /// read as an opaque `{"tcp": ["host:port", ...]}` shape; malformed or
    /// absent entries are skipped rather than rejected, since `addrs` is a
    /// best-effort hint, not part of the signed invariants.
    pub fn from_record(record: &PeerRecord) -> Self {
        let addrs = record
            .addrs
            .get("tcp")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse::<SocketAddr>().ok())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: PeerId::new(record.device_id.clone()),
            addrs,
            last_seen_ms: record.ts,
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = now_ms;
    }
}
