use std::sync::Arc;

use intake_core::model::SessionId;
use storage::repository::{IdentityStore, StorageError};
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Whether the identity survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Durable,
    /// The identity store could not be used; answers are keyed by an id that
    /// is forgotten when the process exits.
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    id: SessionId,
    durability: Durability,
}

impl SessionIdentity {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn durability(&self) -> Durability {
        self.durability
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.durability == Durability::Ephemeral
    }
}

/// Hands out the visitor's session id, creating and persisting it on first use.
///
/// Resolution happens at most once per provider; concurrent callers wait for
/// the same result instead of racing to create two ids.
pub struct IdentityProvider {
    store: Arc<dyn IdentityStore>,
    resolved: OnceCell<SessionIdentity>,
}

impl IdentityProvider {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve the identity, loading or creating it on the first call.
    ///
    /// Never fails: an unusable store degrades to an ephemeral id.
    pub async fn ensure_identity(&self) -> SessionIdentity {
        *self.resolved.get_or_init(|| self.resolve()).await
    }

    /// The resolved id, or `None` while `ensure_identity` has not completed.
    #[must_use]
    pub fn current_identity(&self) -> Option<SessionId> {
        self.resolved.get().map(SessionIdentity::id)
    }

    #[must_use]
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.resolved.get().copied()
    }

    async fn resolve(&self) -> SessionIdentity {
        match self.store.load().await {
            Ok(Some(id)) => {
                info!(session_id = %id, "resumed session");
                SessionIdentity {
                    id,
                    durability: Durability::Durable,
                }
            }
            Ok(None) => self.create().await,
            Err(StorageError::Serialization(reason)) => {
                warn!(%reason, "stored identity is unreadable; replacing it");
                self.create().await
            }
            Err(err) => {
                let id = SessionId::generate();
                warn!(
                    error = %err,
                    session_id = %id,
                    "identity store unavailable; answers will not survive a restart"
                );
                SessionIdentity {
                    id,
                    durability: Durability::Ephemeral,
                }
            }
        }
    }

    async fn create(&self) -> SessionIdentity {
        let id = SessionId::generate();
        match self.store.save(id).await {
            Ok(()) => {
                info!(session_id = %id, "created session");
                SessionIdentity {
                    id,
                    durability: Durability::Durable,
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    session_id = %id,
                    "could not persist new identity; answers will not survive a restart"
                );
                SessionIdentity {
                    id,
                    durability: Durability::Ephemeral,
                }
            }
        }
    }
}
