//! Replication configuration.

use ulid::Ulid;

/// Configuration for one replicated document.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Room the document is shared in. Peers only exchange updates for the
    /// same room.
    pub room: String,
    /// Replica id stamped on every local write. Must be unique per peer.
    pub replica_id: String,
    /// Fail a remote batch on the first invalid mutation instead of logging
    /// and skipping it.
    pub strict_remote: bool,
    /// Park references and attachments whose target has not arrived yet and
    /// replay them when it does.
    pub retry_pending_refs: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            room: "default".to_string(),
            replica_id: Ulid::new().to_string(),
            strict_remote: false,
            retry_pending_refs: true,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.config.room = room.into();
        self
    }

    pub fn replica_id(mut self, replica_id: impl Into<String>) -> Self {
        self.config.replica_id = replica_id.into();
        self
    }

    pub fn strict_remote(mut self, strict: bool) -> Self {
        self.config.strict_remote = strict;
        self
    }

    pub fn retry_pending_refs(mut self, enabled: bool) -> Self {
        self.config.retry_pending_refs = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
