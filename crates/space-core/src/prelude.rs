//! Convenience re-exports for embedders.

pub use crate::acceptance::{accept_event, Accepted, AcceptanceContext, RejectReason};
pub use crate::clock::{Clock, Csprng, FixedClock, OsRngHandle, SystemClock, TestCsprng};
pub use crate::crypto::KeyPair;
pub use crate::dag::{MemoryRoomLog, RoomLog};
pub use crate::error::{Error, Result};
pub use crate::event::Event;
pub use crate::genesis::SpaceGenesis;
pub use crate::governance::{GovernancePolicy, GovernanceState, SpaceRootOnlyPolicy, GOVERNANCE_ROOM};
pub use crate::identity::{DelegationCert, Identity};
pub use crate::invite::{Invite, InviteIssuerCertificate};
pub use crate::peer::PeerRecord;
pub use crate::sync::{EventAcceptor, SyncFrame, SyncSession};
