//! Plain-TCP transport
//!
//! No QUIC, no end-to-end encryption: the protocol's signatures are the
//! trust boundary (§5 "the transport channel is treated as untrusted; it
//! cannot forge signatures"), so a bare ordered byte stream is sufficient
//! for this reference embedding. Each accepted or dialed connection gets a
//! read task and a bounded outbound channel, mirroring the teacher's
//! `Connection`/`Transport` split.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::framing::{Frame, FrameCodec, FrameError};
use crate::peer::{PeerId, PeerInfo};

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("peer not connected: {0}")]
    PeerNotFound(PeerId),
}

/// An open connection to one peer.
pub struct Connection {
    pub peer_id: PeerId,
    tx: mpsc::Sender<Frame>,
    open: Arc<RwLock<bool>>,
}

impl Connection {
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !*self.open.read() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    pub fn close(&self) {
        *self.open.write() = false;
    }
}

/// Events the transport surfaces to the embedder (`space-node`'s server).
#[derive(Debug)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    FrameReceived { from: PeerId, frame: Frame },
}

/// Manages inbound and outbound TCP connections for one local Device.
pub struct Transport {
    our_id: PeerId,
    listen_addr: SocketAddr,
    connections: RwLock<HashMap<PeerId, Arc<Connection>>>,
    known_peers: RwLock<HashMap<PeerId, PeerInfo>>,
}

impl Transport {
    pub fn new(our_id: PeerId, listen_addr: SocketAddr) -> Self {
        Self {
            our_id,
            listen_addr,
            connections: RwLock::new(HashMap::new()),
            known_peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn our_id(&self) -> &PeerId {
        &self.our_id
    }

    pub fn add_peer(&self, peer: PeerInfo) {
        self.known_peers.write().insert(peer.id.clone(), peer);
    }

    pub fn get_peer(&self, id: &PeerId) -> Option<PeerInfo> {
        self.known_peers.read().get(id).cloned()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.read().keys().cloned().collect()
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connections.read().get(id).map(|c| c.is_open()).unwrap_or(false)
    }

    pub async fn send(&self, to: &PeerId, frame: Frame) -> Result<(), TransportError> {
        let conn = self
            .connections
            .read()
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::PeerNotFound(to.clone()))?;
        conn.send(frame).await
    }

    pub async fn broadcast(&self, frame: Frame) {
        let connections: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in connections {
            if let Err(e) = conn.send(frame.clone()).await {
                warn!(peer = %conn.peer_id, error = %e, "failed to broadcast frame");
            }
        }
    }

    /// Accept inbound connections forever, registering each and spawning a
    /// read loop that forwards frames to `event_tx`.
    pub async fn listen(
        self: Arc<Self>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "transport listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let this = Arc::clone(&self);
            let tx = event_tx.clone();
            // The peer announces its identity in its first Sync Hello frame;
            // until then we key the connection by its socket address.
            let placeholder_id = PeerId::new(format!("tcp:{addr}"));
            tokio::spawn(async move {
                if let Err(e) = this.handle_stream(placeholder_id, stream, tx).await {
                    warn!(%addr, error = %e, "connection ended");
                }
            });
        }
    }

    /// Dial a peer and register the resulting connection.
    pub async fn dial(
        self: Arc<Self>,
        peer_id: PeerId,
        addr: SocketAddr,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        self.handle_stream(peer_id, stream, event_tx).await
    }

    async fn handle_stream(
        &self,
        peer_id: PeerId,
        stream: TcpStream,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let mut framed = Framed::new(stream, FrameCodec);
        let (tx, mut rx) = mpsc::channel::<Frame>(64);
        let open = Arc::new(RwLock::new(true));
        let conn = Arc::new(Connection { peer_id: peer_id.clone(), tx, open: open.clone() });
        self.connections.write().insert(peer_id.clone(), conn);

        let _ = event_tx.send(TransportEvent::PeerConnected(peer_id.clone())).await;

        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            if framed.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = framed.next() => {
                    match incoming {
                        Some(Ok(frame)) => {
                            if event_tx
                                .send(TransportEvent::FrameReceived { from: peer_id.clone(), frame })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(peer = %peer_id, error = %e, "frame decode error, closing connection");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        *open.write() = false;
        self.connections.write().remove(&peer_id);
        let _ = event_tx.send(TransportEvent::PeerDisconnected(peer_id)).await;
        Ok(())
    }
}
