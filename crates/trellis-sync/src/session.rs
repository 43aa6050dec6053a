//! Session management: one peer's editor connected to a room.
//!
//! A [`Session`] ties together an [`Editor`], a [`Bridge`] and a transport.
//! Local work is committed to the replicated document before any remote
//! update is applied, so the store never mixes a remote batch with local
//! changes the document has not seen. While an action is open, incoming
//! messages are held back until it closes.

use crate::bridge::{Bridge, RemoteReport};
use crate::config::SyncConfig;
use crate::doc::{DocUpdate, ReplicatedDoc};
use crate::error::{Result, SyncError};
use crate::network::{Message, MessageReceiver, NetworkTransport, PeerId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use trellis_graph::{Editor, Store};

/// Events emitted by a session.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The session announced itself to its peers.
    Connected,
    /// A peer said hello.
    PeerJoined { peer_id: PeerId, replica_id: String },
    /// A peer said goodbye and unlinked.
    PeerLeft { peer_id: PeerId },
    /// This session unlinked from every peer.
    Left { peers: usize },
    /// Local updates were broadcast.
    Flushed { updates: usize },
    /// A peer's update was reconciled into the store.
    RemoteApplied { peer_id: PeerId, report: RemoteReport },
    /// A peer's full state was merged.
    StateMerged { peer_id: PeerId, report: RemoteReport },
    /// Incoming messages were held back because an action is open.
    Deferred { queued: usize },
}

/// A collaborative editing session over one room.
pub struct Session<T: NetworkTransport, C = ()> {
    editor: Editor<C>,
    bridge: Bridge,
    transport: Arc<T>,
    inbox: MessageReceiver,
    deferred: VecDeque<(PeerId, Message)>,
    unsent: Vec<DocUpdate>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T: NetworkTransport> Session<T> {
    /// Create a session with a plain editor over an empty page.
    pub fn new(transport: Arc<T>, config: SyncConfig) -> Result<Self> {
        let bridge = Bridge::new(config);
        let editor = Editor::with_store(bridge.new_store()?);
        Self::from_parts(transport, bridge, editor)
    }
}

impl<T: NetworkTransport, C> Session<T, C> {
    /// Create a session around an existing editor.
    ///
    /// The editor's store must be rooted at the room's page root
    /// ([`ReplicatedDoc::root_id_for`]).
    pub fn with_editor(transport: Arc<T>, config: SyncConfig, editor: Editor<C>) -> Result<Self> {
        let root = ReplicatedDoc::root_id_for(&config.room);
        if editor.store().root() != Some(&root) {
            return Err(SyncError::UnknownRoom(format!(
                "store is not rooted at {root}"
            )));
        }
        Self::from_parts(transport, Bridge::new(config), editor)
    }

    fn from_parts(transport: Arc<T>, bridge: Bridge, editor: Editor<C>) -> Result<Self> {
        let inbox = transport.subscribe()?;
        let (event_tx, _) = broadcast::channel(100);
        Ok(Self {
            editor,
            bridge,
            transport,
            inbox,
            deferred: VecDeque::new(),
            unsent: Vec::new(),
            event_tx,
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        self.transport.local_id()
    }

    pub fn room(&self) -> &str {
        self.bridge.room()
    }

    pub fn editor(&self) -> &Editor<C> {
        &self.editor
    }

    /// The editor, for local edits. Call [`Session::flush`] to publish them.
    pub fn editor_mut(&mut self) -> &mut Editor<C> {
        &mut self.editor
    }

    pub fn store(&self) -> &Store {
        self.editor.store()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    // === Outgoing ===

    /// Announce this peer and ask the others for their state.
    pub async fn connect(&self) -> Result<()> {
        self.transport
            .broadcast(Message::Hello {
                replica_id: self.bridge.config().replica_id.clone(),
            })
            .await?;
        self.request_sync().await?;
        let _ = self.event_tx.send(SessionEvent::Connected);
        Ok(())
    }

    /// Link to one more peer, introduce this session and ask for its state.
    pub async fn join(&self, peer_id: &PeerId) -> Result<()> {
        self.transport.connect(peer_id).await?;
        self.transport
            .send(
                peer_id,
                Message::Hello {
                    replica_id: self.bridge.config().replica_id.clone(),
                },
            )
            .await?;
        self.transport
            .send(
                peer_id,
                Message::SyncRequest {
                    room: self.room().to_string(),
                },
            )
            .await?;
        debug!(room = %self.room(), peer = %peer_id, "joined peer");
        Ok(())
    }

    /// Say goodbye and unlink from every peer. Call [`Session::flush`] first
    /// to publish outstanding work. Returns the number of peers left.
    pub async fn leave(&self) -> Result<usize> {
        self.transport.broadcast(Message::Bye).await?;
        let peers = self.transport.connected_peers().await;
        for peer_id in &peers {
            self.transport.disconnect(peer_id).await?;
        }
        debug!(room = %self.room(), peers = peers.len(), "left room");
        let _ = self.event_tx.send(SessionEvent::Left { peers: peers.len() });
        Ok(peers.len())
    }

    /// Peers the transport is currently linked to.
    pub async fn peers(&self) -> Vec<PeerId> {
        self.transport.connected_peers().await
    }

    /// Ask every peer for its full state of the room.
    pub async fn request_sync(&self) -> Result<()> {
        self.transport
            .broadcast(Message::SyncRequest {
                room: self.room().to_string(),
            })
            .await?;
        Ok(())
    }

    /// Commit finished local work to the replicated document and broadcast
    /// it. Returns the number of updates sent.
    pub async fn flush(&mut self) -> Result<usize> {
        self.commit_outgoing()?;

        let updates = std::mem::take(&mut self.unsent);
        for (index, update) in updates.iter().enumerate() {
            let sent = match ReplicatedDoc::encode_update(update) {
                Ok(payload) => self
                    .transport
                    .broadcast(Message::Update {
                        room: self.room().to_string(),
                        payload,
                    })
                    .await
                    .map_err(SyncError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = sent {
                self.unsent.extend(updates[index..].iter().cloned());
                return Err(err);
            }
        }

        if !updates.is_empty() {
            debug!(room = %self.room(), updates = updates.len(), "flushed local updates");
            let _ = self.event_tx.send(SessionEvent::Flushed {
                updates: updates.len(),
            });
        }
        Ok(updates.len())
    }

    /// Encode the editor's committed transactions into the replicated
    /// document, in submission order.
    fn commit_outgoing(&mut self) -> Result<()> {
        let bridge = &mut self.bridge;
        for tx in self.editor.take_outgoing() {
            let update = self
                .editor
                .with_store_mut(|store| bridge.commit_local(store, &tx))?;
            if !update.is_empty() {
                self.unsent.push(update);
            }
        }
        Ok(())
    }

    // === Incoming ===

    /// Handle everything that has arrived. Returns the number of messages
    /// handled; messages stay queued while an action is open.
    pub async fn receive(&mut self) -> Result<usize> {
        while let Ok(incoming) = self.inbox.try_recv() {
            self.deferred.push_back(incoming);
        }
        if self.deferred.is_empty() {
            return Ok(0);
        }
        if self.editor.history().is_open() {
            let _ = self.event_tx.send(SessionEvent::Deferred {
                queued: self.deferred.len(),
            });
            return Ok(0);
        }

        self.commit_outgoing()?;
        let mut handled = 0;
        while let Some((peer_id, message)) = self.deferred.pop_front() {
            self.handle(peer_id, message).await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn handle(&mut self, peer_id: PeerId, message: Message) -> Result<()> {
        match message {
            Message::Hello { replica_id } => {
                let _ = self
                    .event_tx
                    .send(SessionEvent::PeerJoined { peer_id, replica_id });
            }
            Message::Bye => {
                debug!(room = %self.room(), peer = %peer_id, "peer left");
                let _ = self.event_tx.send(SessionEvent::PeerLeft { peer_id });
            }
            Message::Update { room, payload } => {
                if room != self.room() {
                    debug!(room = %room, "ignoring update for another room");
                    return Ok(());
                }
                let Some(update) = self.lenient(&peer_id, ReplicatedDoc::decode_update(&payload))?
                else {
                    return Ok(());
                };
                let bridge = &mut self.bridge;
                let report = self
                    .editor
                    .with_store_mut(|store| bridge.apply_remote(store, &update))?;
                let _ = self
                    .event_tx
                    .send(SessionEvent::RemoteApplied { peer_id, report });
            }
            Message::SyncRequest { room } => {
                if room != self.room() {
                    debug!(room = %room, "ignoring sync request for another room");
                    return Ok(());
                }
                let state = self.bridge.doc().encode_state()?;
                self.transport
                    .send(&peer_id, Message::SyncResponse { room, state })
                    .await?;
            }
            Message::SyncResponse { room, state } => {
                if room != self.room() {
                    debug!(room = %room, "ignoring state for another room");
                    return Ok(());
                }
                let Some(state) = self.lenient(&peer_id, ReplicatedDoc::decode_state(&state))? else {
                    return Ok(());
                };
                let bridge = &mut self.bridge;
                let report = self
                    .editor
                    .with_store_mut(|store| bridge.merge_remote_state(store, &state))?;
                let _ = self
                    .event_tx
                    .send(SessionEvent::StateMerged { peer_id, report });
            }
        }
        Ok(())
    }

    /// A payload that does not decode is an error in strict mode and is
    /// skipped with a warning otherwise.
    fn lenient<V>(&self, peer_id: &PeerId, decoded: Result<V>) -> Result<Option<V>> {
        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.bridge.config().strict_remote => Err(err),
            Err(err) => {
                warn!(room = %self.room(), peer = %peer_id, error = %err, "skipping malformed payload");
                Ok(None)
            }
        }
    }
}
