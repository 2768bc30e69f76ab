//! Session bootstrap: the thin create-or-resume contract the transport
//! layer calls before any turns flow.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use tally_storage::ChatStore;

use crate::error::ChatError;

/// Whether the bootstrap created a fresh session or connected to an
/// existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapStatus {
    Created,
    Connected,
}

impl BootstrapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapStatus::Created => "created",
            BootstrapStatus::Connected => "connected",
        }
    }
}

/// The bootstrap result handed back to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapOutcome {
    pub session_id: Uuid,
    pub status: BootstrapStatus,
}

/// Creates or resumes sessions by opaque identifier.
pub struct SessionBootstrap {
    store: Arc<ChatStore>,
}

impl SessionBootstrap {
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }

    /// Resolve an existing session or create a new one.
    ///
    /// Supplying an identifier that does not resolve is an error so the
    /// caller can reject or close; supplying none always creates.
    pub async fn open(
        &self,
        session_id: Option<Uuid>,
        user: Option<String>,
    ) -> Result<BootstrapOutcome, ChatError> {
        let store = Arc::clone(&self.store);
        let session = tokio::task::spawn_blocking(move || {
            store.resolve_or_create_session(session_id, user.as_deref())
        })
        .await??;

        let status = if session_id.is_some() {
            BootstrapStatus::Connected
        } else {
            BootstrapStatus::Created
        };
        info!(session_id = %session.id, status = status.as_str(), "Session opened");

        Ok(BootstrapOutcome {
            session_id: session.id,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tally_storage::Database;

    fn bootstrap() -> (SessionBootstrap, Arc<ChatStore>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = Arc::new(ChatStore::new(db));
        (SessionBootstrap::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_open_without_id_creates() {
        let (boot, store) = bootstrap();
        let outcome = boot.open(None, None).await.unwrap();
        assert_eq!(outcome.status, BootstrapStatus::Created);
        assert!(store.get_session(outcome.session_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_with_known_id_connects() {
        let (boot, _store) = bootstrap();
        let created = boot.open(None, None).await.unwrap();
        let resumed = boot.open(Some(created.session_id), None).await.unwrap();
        assert_eq!(resumed.status, BootstrapStatus::Connected);
        assert_eq!(resumed.session_id, created.session_id);
    }

    #[tokio::test]
    async fn test_open_with_unknown_id_is_rejected() {
        let (boot, _store) = bootstrap();
        let missing = Uuid::new_v4();
        let result = boot.open(Some(missing), None).await;
        assert!(matches!(
            result,
            Err(ChatError::SessionNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_open_records_owner() {
        let (boot, store) = bootstrap();
        let outcome = boot.open(None, Some("maria".to_string())).await.unwrap();
        let session = store.get_session(outcome.session_id).unwrap().unwrap();
        assert_eq!(session.user.as_deref(), Some("maria"));
    }

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = BootstrapOutcome {
            session_id: Uuid::nil(),
            status: BootstrapStatus::Created,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "created");
        assert_eq!(
            value["session_id"],
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
