//! Library half of the `space-node` binary: configuration, persisted node
//! state, per-Room state, and the server loop. Split out so the server can
//! be exercised from tests without going through `main`.

pub mod config;
pub mod room;
pub mod server;
