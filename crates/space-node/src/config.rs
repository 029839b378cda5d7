//! Configuration for space-node

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// space-node — p2pspace reference daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "space-node")]
#[command(about = "p2pspace reference daemon: identity, acceptance, storage, and TCP sync")]
pub struct Config {
    /// Listen address for inbound sync connections
    #[arg(short, long, default_value = "0.0.0.0:7420")]
    pub listen: SocketAddr,

    /// Data directory for persistent storage and the identity file
    #[arg(short, long, default_value = "./data/space-node")]
    pub data_dir: PathBuf,

    /// Space this node has already joined (its root principal_id); omit to
    /// run idle until an invite is redeemed out of band
    #[arg(long, env = "SPACE_ID")]
    pub space_id: Option<String>,

    /// Rooms within `space_id` to keep synchronized, beyond `governance`
    #[arg(long, value_delimiter = ',')]
    pub rooms: Vec<String>,

    /// Bootstrap peers (comma-separated `host:port`)
    #[arg(long, value_delimiter = ',')]
    pub bootstrap: Vec<SocketAddr>,

    /// Background re-sync interval, in seconds
    #[arg(long, default_value = "30")]
    pub sync_interval_secs: u64,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format: "json" or "pretty"
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration that can't be expressed with `clap` alone.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(space_id) = &self.space_id {
            if !space_id.starts_with("ed25519:") {
                anyhow::bail!("space_id must be an ed25519: identifier, got {space_id:?}");
            }
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            anyhow::bail!("log_format must be \"json\" or \"pretty\", got {:?}", self.log_format);
        }
        Ok(())
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity.json")
    }

    pub fn sled_path(&self) -> PathBuf {
        self.data_dir.join("rooms.sled")
    }
}

/// Persisted identity material: the two Ed25519 seeds backing a node's
/// [`space_core::identity::Identity`] (§9 persistence format — seeds are
/// sufficient since delegations are re-synthesized on demand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub principal_seed: [u8; 32],
    pub device_seed: [u8; 32],
}

impl NodeState {
    pub fn generate(rng: &mut dyn space_core::clock::Csprng) -> Self {
        let mut principal_seed = [0u8; 32];
        let mut device_seed = [0u8; 32];
        rng.fill_bytes(&mut principal_seed);
        rng.fill_bytes(&mut device_seed);
        Self { principal_seed, device_seed }
    }

    pub fn to_identity(&self) -> space_core::identity::Identity {
        let principal = space_core::crypto::KeyPair::from_seed(&self.principal_seed);
        let device = space_core::crypto::KeyPair::from_seed(&self.device_seed);
        space_core::identity::Identity::from_keys(principal, device)
    }

    /// Load from `path`, generating and persisting a fresh identity if the
    /// file doesn't exist yet.
    pub fn load_or_create(path: &std::path::Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            let bytes = std::fs::read(path)?;
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let mut rng = space_core::clock::OsRngHandle;
            let state = Self::generate(&mut rng);
            std::fs::write(path, serde_json::to_vec_pretty(&state)?)?;
            Ok(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.to_path_buf(),
            space_id: None,
            rooms: vec![],
            bootstrap: vec![],
            sync_interval_secs: 30,
            verbose: false,
            log_format: "pretty".to_string(),
        }
    }

    #[test]
    fn validate_accepts_default_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(test_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_space_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.space_id = Some("not-an-id".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn node_state_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let first = NodeState::load_or_create(&path).unwrap();
        let second = NodeState::load_or_create(&path).unwrap();
        assert_eq!(first.principal_seed, second.principal_seed);
        assert_eq!(first.device_seed, second.device_seed);
    }
}
