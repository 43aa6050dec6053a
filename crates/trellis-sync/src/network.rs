//! Network transport abstractions for document replication.
//!
//! The core never talks to a network directly: a [`Session`](crate::Session)
//! hands encoded updates to a [`NetworkTransport`] and drains what arrives.
//! [`MemoryTransport`] connects peers inside one process for tests and
//! simulation. Transports created from the same [`MemoryNetwork`] can find
//! each other by id and link or unlink at any time.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages exchanged between peers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// Handshake.
    Hello { replica_id: String },
    /// The sender is leaving and unlinking from everyone.
    Bye,
    /// One committed replication transaction for a room.
    Update { room: String, payload: Vec<u8> },
    /// Ask a peer for its full state of a room.
    SyncRequest { room: String },
    /// Full state of a room, answering a [`Message::SyncRequest`].
    SyncResponse { room: String, state: Vec<u8> },
}

/// Network error type.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Already subscribed")]
    AlreadySubscribed,
}

/// Receiving end of a transport.
pub type MessageReceiver = mpsc::UnboundedReceiver<(PeerId, Message)>;

/// Abstract network transport trait.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    /// Id of the local peer.
    fn local_id(&self) -> &PeerId;

    /// Link to a peer so messages flow both ways.
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Drop the link to a peer, in both directions.
    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Send a message to a specific peer.
    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError>;

    /// Broadcast a message to all connected peers.
    async fn broadcast(&self, message: Message) -> Result<(), NetworkError>;

    /// Ids of the currently linked peers, sorted.
    async fn connected_peers(&self) -> Vec<PeerId>;

    /// Take the stream of incoming messages. Only one subscriber is allowed.
    fn subscribe(&self) -> Result<MessageReceiver, NetworkError>;
}

type Inbox = mpsc::UnboundedSender<(PeerId, Message)>;
/// Outgoing links of one transport, shared so a peer can link back.
type SharedLinks = Arc<RwLock<HashMap<PeerId, Inbox>>>;
/// Type alias for the message receiver shared across threads.
type SharedMessageReceiver = Arc<RwLock<Option<MessageReceiver>>>;

/// What the directory knows about a registered transport.
#[derive(Clone)]
struct Endpoint {
    inbox: Inbox,
    links: SharedLinks,
}

/// Directory of in-memory transports that can reach each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    directory: Arc<RwLock<HashMap<PeerId, Endpoint>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transport under `local_id`. It starts with no links.
    pub fn transport(&self, local_id: PeerId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Endpoint {
            inbox: tx,
            links: Arc::new(RwLock::new(HashMap::new())),
        };
        self.directory
            .write()
            .insert(local_id.clone(), endpoint.clone());
        MemoryTransport {
            local_id,
            network: self.clone(),
            endpoint,
            message_rx: Arc::new(RwLock::new(Some(rx))),
        }
    }

    fn endpoint(&self, peer_id: &PeerId) -> Option<Endpoint> {
        self.directory.read().get(peer_id).cloned()
    }
}

/// In-memory transport for testing and simulation.
///
/// Channels are unbounded so a peer can broadcast while nobody is draining;
/// delivery order per sender is preserved.
pub struct MemoryTransport {
    local_id: PeerId,
    network: MemoryNetwork,
    endpoint: Endpoint,
    message_rx: SharedMessageReceiver,
}

impl MemoryTransport {
    /// A transport alone on its own network.
    pub fn new(local_id: PeerId) -> Self {
        MemoryNetwork::new().transport(local_id)
    }

    /// The network this transport is registered on.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    fn link(&self, peer_id: &PeerId, remote: &Endpoint) {
        self.endpoint
            .links
            .write()
            .insert(peer_id.clone(), remote.inbox.clone());
        remote
            .links
            .write()
            .insert(self.local_id.clone(), self.endpoint.inbox.clone());
    }
}

#[async_trait]
impl NetworkTransport for MemoryTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if *peer_id == self.local_id {
            return Err(NetworkError::ConnectionFailed(format!(
                "{peer_id} cannot connect to itself"
            )));
        }
        let remote = self.network.endpoint(peer_id).ok_or_else(|| {
            NetworkError::ConnectionFailed(format!("no peer {peer_id} on this network"))
        })?;
        self.link(peer_id, &remote);
        Ok(())
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if self.endpoint.links.write().remove(peer_id).is_none() {
            return Err(NetworkError::PeerNotFound(peer_id.to_string()));
        }
        if let Some(remote) = self.network.endpoint(peer_id) {
            remote.links.write().remove(&self.local_id);
        }
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError> {
        let tx = {
            let links = self.endpoint.links.read();
            links.get(peer_id).cloned()
        };

        match tx {
            Some(tx) => tx
                .send((self.local_id.clone(), message))
                .map_err(|e| NetworkError::SendFailed(e.to_string())),
            None => Err(NetworkError::PeerNotFound(peer_id.to_string())),
        }
    }

    async fn broadcast(&self, message: Message) -> Result<(), NetworkError> {
        let senders: Vec<_> = {
            let links = self.endpoint.links.read();
            links.values().cloned().collect()
        };

        for tx in senders {
            let _ = tx.send((self.local_id.clone(), message.clone()));
        }
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.endpoint.links.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn subscribe(&self) -> Result<MessageReceiver, NetworkError> {
        self.message_rx
            .write()
            .take()
            .ok_or(NetworkError::AlreadySubscribed)
    }
}

/// Create `count` transports on one network, every pair linked.
pub fn create_network(count: usize) -> Vec<MemoryTransport> {
    let network = MemoryNetwork::new();
    let transports: Vec<_> = (0..count)
        .map(|i| network.transport(PeerId::new(format!("peer-{}", i))))
        .collect();

    for (i, transport) in transports.iter().enumerate() {
        for other in &transports[i + 1..] {
            transport.link(&other.local_id, &other.endpoint);
        }
    }

    transports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(name: &str) -> Message {
        Message::Hello {
            replica_id: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_links_both_ways() {
        let network = MemoryNetwork::new();
        let a = network.transport(PeerId::new("a"));
        let b = network.transport(PeerId::new("b"));
        let mut inbox = a.subscribe().unwrap();
        assert!(a.connected_peers().await.is_empty());

        a.connect(&PeerId::new("b")).await.unwrap();
        assert_eq!(a.connected_peers().await, vec![PeerId::new("b")]);
        assert_eq!(b.connected_peers().await, vec![PeerId::new("a")]);

        // b never called connect but can answer
        b.send(&PeerId::new("a"), hello("b")).await.unwrap();
        let (from, message) = inbox.try_recv().unwrap();
        assert_eq!(from, PeerId::new("b"));
        assert!(matches!(message, Message::Hello { replica_id } if replica_id == "b"));
    }

    #[tokio::test]
    async fn test_connect_needs_a_registered_peer() {
        let network = MemoryNetwork::new();
        let a = network.transport(PeerId::new("a"));
        let elsewhere = MemoryTransport::new(PeerId::new("b"));

        let result = a.connect(elsewhere.local_id()).await;
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
        assert!(matches!(
            a.connect(&PeerId::new("a")).await,
            Err(NetworkError::ConnectionFailed(_))
        ));
        assert!(a.connected_peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_stops_delivery_both_ways() {
        let network = create_network(3);
        let mut inbox = network[1].subscribe().unwrap();
        let (zero, one) = (PeerId::new("peer-0"), PeerId::new("peer-1"));

        network[1].disconnect(&zero).await.unwrap();
        assert_eq!(network[1].connected_peers().await, vec![PeerId::new("peer-2")]);
        assert_eq!(network[0].connected_peers().await, vec![PeerId::new("peer-2")]);

        network[0].broadcast(hello("zero")).await.unwrap();
        assert!(inbox.try_recv().is_err());
        assert_eq!(
            network[0].send(&one, hello("zero")).await,
            Err(NetworkError::PeerNotFound("peer-1".to_string()))
        );
        assert_eq!(
            network[1].disconnect(&zero).await,
            Err(NetworkError::PeerNotFound("peer-0".to_string()))
        );

        // Linking again restores the path
        network[0].connect(&one).await.unwrap();
        network[0].send(&one, hello("zero")).await.unwrap();
        assert_eq!(inbox.try_recv().unwrap().0, zero);
    }

    #[tokio::test]
    async fn test_create_network_links_every_pair() {
        let network = create_network(4);
        for transport in &network {
            let peers = transport.connected_peers().await;
            assert_eq!(peers.len(), 3);
            assert!(!peers.contains(transport.local_id()));
        }
    }

    #[tokio::test]
    async fn test_subscribe_once() {
        let transport = MemoryTransport::new(PeerId::new("alone"));
        let _inbox = transport.subscribe().unwrap();
        assert_eq!(
            transport.subscribe().err(),
            Some(NetworkError::AlreadySubscribed)
        );
    }
}
