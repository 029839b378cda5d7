//! space-node server — wires identity, storage, and the sync protocol to
//! the TCP transport.
//!
//! One TCP connection carries every Room this node shares with that peer;
//! each `(space_id, room_id)` pair gets its own [`SyncSession`] (§5 "no
//! global lock"), looked up by `(peer, space_id, room_id)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use space_core::clock::{Clock, SystemClock};
use space_core::genesis::SpaceGenesis;
use space_core::governance::GOVERNANCE_ROOM;
use space_core::identity::Identity;
use space_core::sync::{EventAcceptor, SyncFrame, SyncSession};
use space_net::{Frame, FrameType, PeerId, Transport, TransportEvent};
use space_storage::SledRoomLog;

use crate::config::{Config, NodeState};
use crate::room::RoomState;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] space_storage::StorageError),
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("core error: {0}")]
    Core(#[from] space_core::error::Error),
}

type RoomKey = (String, String);
type SessionKey = (PeerId, String, String);

/// The running node: identity, joined rooms, and the transport that carries
/// their sync traffic.
pub struct Server {
    config: Config,
    identity: Mutex<Identity>,
    clock: Arc<dyn Clock + Send + Sync>,
    db: sled::Db,
    spaces: sled::Tree,
    rooms: RwLock<HashMap<RoomKey, Mutex<RoomState>>>,
    sessions: Mutex<HashMap<SessionKey, SyncSession>>,
    transport: Arc<Transport>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let node_state = NodeState::load_or_create(&config.identity_path())
            .map_err(|e| ServerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let identity = node_state.to_identity();
        let our_id = PeerId::new(identity.device_id.clone());

        let db = sled::open(config.sled_path())?;
        let spaces = db.open_tree("spaces")?;

        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);
        let transport = Arc::new(Transport::new(our_id, config.listen));
        let (shutdown_tx, _) = broadcast::channel(1);

        let server = Self {
            config,
            identity: Mutex::new(identity),
            clock,
            db,
            spaces,
            rooms: RwLock::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            transport,
            shutdown_tx,
        };

        if let Some(space_id) = server.config.space_id.clone() {
            if let Some(root_pub) = server.lookup_space_root(&space_id)? {
                server.open_room(&space_id, GOVERNANCE_ROOM, root_pub)?;
                for room_id in server.config.rooms.clone() {
                    server.open_room(&space_id, &room_id, root_pub)?;
                }
            } else {
                warn!(%space_id, "configured space has no persisted genesis; call join_space first");
            }
        }

        Ok(server)
    }

    pub fn device_id(&self) -> String {
        self.identity.lock().device_id.clone()
    }

    fn lookup_space_root(&self, space_id: &str) -> Result<Option<[u8; 32]>, ServerError> {
        match self.spaces.get(space_id.as_bytes())? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| space_core::error::Error::InvalidPublicKey("bad stored space root".into()))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }

    /// Verify and persist a Space's genesis, then open its governance room.
    /// This is how a node records the Space Root key it needs to validate
    /// every event in that Space (§4.5 "authorization", §9).
    pub fn join_space(&self, genesis: &SpaceGenesis) -> Result<(), ServerError> {
        genesis.verify()?;
        let root_pub = genesis.space_root_pub_bytes()?;
        self.spaces.insert(genesis.space_id.as_bytes(), &root_pub)?;
        self.open_room(&genesis.space_id, GOVERNANCE_ROOM, root_pub)?;
        info!(space_id = %genesis.space_id, "joined space");
        Ok(())
    }

    fn open_room(&self, space_id: &str, room_id: &str, space_root_pub: [u8; 32]) -> Result<(), ServerError> {
        let key = (space_id.to_string(), room_id.to_string());
        if self.rooms.read().contains_key(&key) {
            return Ok(());
        }
        let log = SledRoomLog::open(&self.db, space_id, room_id)?;
        let room = RoomState::new(space_id, room_id, space_root_pub, Box::new(log), self.clock.clone());
        self.rooms.write().insert(key, Mutex::new(room));
        Ok(())
    }

    /// Run the accept loop, dial out to configured bootstrap peers, and
    /// drive a periodic re-sync tick until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        info!(listen = %self.config.listen, device_id = %self.device_id(), "starting space-node");

        let (event_tx, mut event_rx) = mpsc::channel(256);
        let listen_transport = self.transport.clone();
        let listen_event_tx = event_tx.clone();
        let listen_task = tokio::spawn(async move {
            if let Err(e) = listen_transport.listen(listen_event_tx).await {
                warn!(error = %e, "transport listener exited");
            }
        });

        self.dial_bootstrap_peers(&event_tx);

        let sync_interval = std::time::Duration::from_secs(self.config.sync_interval_secs.max(1));
        let mut sync_ticker = tokio::time::interval(sync_interval);
        sync_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sync_ticker.tick().await; // first tick fires immediately, nothing to resync yet

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    self.handle_transport_event(event).await;
                }
                _ = sync_ticker.tick() => {
                    self.resync_all_peers().await;
                    // Retry any bootstrap peer we're still not connected to,
                    // in case it wasn't listening yet at startup.
                    self.dial_bootstrap_peers(&event_tx);
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    break;
                }
                else => break,
            }
        }

        listen_task.abort();
        for room in self.rooms.read().values() {
            let _ = room; // rooms flush themselves via sled on drop
        }
        self.db.flush()?;
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Dial every configured bootstrap address we're not already connected
    /// to. Called at startup and on every re-sync tick, since a bootstrap
    /// peer that wasn't listening yet at startup should still be reachable
    /// eventually.
    fn dial_bootstrap_peers(&self, event_tx: &mpsc::Sender<TransportEvent>) {
        for addr in self.config.bootstrap.clone() {
            let peer_id = PeerId::new(format!("tcp:{addr}"));
            if self.transport.is_connected(&peer_id) {
                continue;
            }
            let dial_transport = self.transport.clone();
            let dial_event_tx = event_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = dial_transport.dial(peer_id, addr, dial_event_tx).await {
                    warn!(%addr, error = %e, "failed to dial bootstrap peer");
                }
            });
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::PeerConnected(peer_id) => {
                self.greet_peer(peer_id).await;
            }
            TransportEvent::PeerDisconnected(peer_id) => {
                self.sessions.lock().retain(|(p, _, _), _| p != &peer_id);
                debug!(peer = %peer_id, "peer disconnected");
            }
            TransportEvent::FrameReceived { from, frame } => {
                self.handle_frame(from, frame).await;
            }
        }
    }

    /// Anti-entropy tick (§4.8): re-open every joined room's sync session
    /// against every currently connected peer, in case a prior round's
    /// frames were dropped or a peer's heads advanced without telling us.
    async fn resync_all_peers(&self) {
        let peers = self.transport.connected_peers();
        debug!(count = peers.len(), "periodic re-sync tick");
        for peer_id in peers {
            self.greet_peer(peer_id).await;
        }
    }

    async fn greet_peer(&self, peer_id: PeerId) {
        let room_keys: Vec<RoomKey> = self.rooms.read().keys().cloned().collect();
        for (space_id, room_id) in room_keys {
            let frames = {
                let rooms = self.rooms.read();
                let room = match rooms.get(&(space_id.clone(), room_id.clone())) {
                    Some(r) => r.lock(),
                    None => continue,
                };
                let mut sessions = self.sessions.lock();
                let session = sessions
                    .entry((peer_id.clone(), space_id.clone(), room_id.clone()))
                    .or_insert_with(|| SyncSession::new(space_id.clone(), room_id.clone(), self.clock.now_ms()));
                session.on_open(&*room)
            };
            for frame in frames {
                self.send_sync_frame(&peer_id, &frame).await;
            }
        }
    }

    async fn handle_frame(&self, from: PeerId, frame: Frame) {
        if frame.frame_type == FrameType::Ping {
            self.send_frame(&from, Frame::pong()).await;
            return;
        }
        if frame.frame_type != FrameType::Sync {
            return;
        }
        let sync_frame = match frame.into_sync() {
            Ok(f) => f,
            Err(e) => {
                warn!(peer = %from, error = %e, "malformed sync frame");
                return;
            }
        };

        let (space_id, room_id) = match &sync_frame {
            SyncFrame::Hello { space_id, room_id, .. }
            | SyncFrame::Heads { space_id, room_id, .. }
            | SyncFrame::Want { space_id, room_id, .. }
            | SyncFrame::Have { space_id, room_id, .. } => (space_id.clone(), room_id.clone()),
        };

        let now = self.clock.now_ms();
        let mut reply = None;
        let mut forward = Vec::new();

        {
            let rooms = self.rooms.read();
            let Some(room_mutex) = rooms.get(&(space_id.clone(), room_id.clone())) else {
                debug!(peer = %from, %space_id, %room_id, "sync frame for unknown room, dropping");
                return;
            };

            let mut sessions = self.sessions.lock();
            let other_peers: Vec<PeerId> = sessions
                .keys()
                .filter(|(peer, s, r)| peer != &from && s == &space_id && r == &room_id)
                .map(|(peer, _, _)| peer.clone())
                .collect();

            let session = sessions
                .entry((from.clone(), space_id.clone(), room_id.clone()))
                .or_insert_with(|| SyncSession::new(space_id.clone(), room_id.clone(), now));

            match sync_frame {
                SyncFrame::Hello { .. } => {
                    let room = room_mutex.lock();
                    reply = session.on_hello(&*room, now).ok().flatten();
                }
                SyncFrame::Heads { heads, .. } => {
                    let room = room_mutex.lock();
                    reply = session.on_heads(heads, &*room, now).ok().flatten();
                }
                SyncFrame::Want { ids, .. } => {
                    let room = room_mutex.lock();
                    reply = session.on_want(ids, |id| room.log().get(id), now).ok().flatten();
                }
                SyncFrame::Have { events, .. } => {
                    let mut room = room_mutex.lock();
                    if let Ok(accepted) = session.on_have(events, &mut *room, now) {
                        // Eagerly forward each newly-accepted event to every
                        // other peer syncing this room (§4.8 forward
                        // propagation), not back to the sender.
                        for event in &accepted {
                            let wire = session.on_new_local_event(event);
                            for peer in &other_peers {
                                forward.push((peer.clone(), wire.clone()));
                            }
                        }
                    }
                }
            }
        }

        if let Some(reply) = reply {
            self.send_sync_frame(&from, &reply).await;
        }
        for (peer, wire) in forward {
            self.send_sync_frame(&peer, &wire).await;
        }
    }

    async fn send_sync_frame(&self, to: &PeerId, frame: &SyncFrame) {
        match Frame::sync(frame) {
            Ok(wire) => self.send_frame(to, wire).await,
            Err(e) => warn!(peer = %to, error = %e, "failed to encode sync frame"),
        }
    }

    async fn send_frame(&self, to: &PeerId, frame: Frame) {
        if let Err(e) = self.transport.send(to, frame).await {
            warn!(peer = %to, error = %e, "failed to send frame");
        }
    }
}
