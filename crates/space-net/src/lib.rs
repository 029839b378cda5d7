//! Reference TCP embedding of the sync transport seam
//!
//! `space-core` only asks for an ordered, untrusted byte channel (§5, §9);
//! this crate supplies one. It has no opinion on protocol semantics — it
//! frames bytes, tracks peers, and hands [`framing::Frame`]s to whatever
//! drives the [`space_core::sync::SyncSession`] on the other side.

pub mod framing;
pub mod peer;
pub mod transport;

pub use framing::{Frame, FrameCodec, FrameType};
pub use peer::{PeerId, PeerInfo};
pub use transport::{Connection, Transport, TransportError, TransportEvent};
