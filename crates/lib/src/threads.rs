//! Per-thread rename and delete, each a user-confirmed action.
//!
//! Deletion is irreversible and destructive, so it is two-phase:
//! `request_delete` hands back a `PendingDelete` that does nothing until
//! `confirm` is called (the confirmation dialog made structural).

use crate::store::{DocumentStore, StoreError};
use std::sync::Arc;

/// Controller for one entry in the thread list.
pub struct ThreadItem {
    store: Arc<dyn DocumentStore>,
    identity_key: String,
    chat_id: String,
}

impl ThreadItem {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity_key: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            identity_key: identity_key.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Durably update the display name. A blank name is a no-op; the list
    /// itself is subscription-driven, so no optimistic local rename is made.
    pub async fn rename(&self, new_name: &str) -> Result<(), StoreError> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        self.store
            .rename_thread(&self.identity_key, &self.chat_id, trimmed)
            .await
    }

    /// First phase of deletion: nothing happens until the returned handle is
    /// confirmed.
    pub fn request_delete(&self) -> PendingDelete {
        PendingDelete {
            store: self.store.clone(),
            identity_key: self.identity_key.clone(),
            chat_id: self.chat_id.clone(),
        }
    }
}

/// A delete awaiting explicit confirmation.
pub struct PendingDelete {
    store: Arc<dyn DocumentStore>,
    identity_key: String,
    chat_id: String,
}

impl PendingDelete {
    /// Delete every message under the thread, then the thread record itself.
    /// Children go first so a half-deleted thread never lists with messages
    /// already vanishing under it.
    pub async fn confirm(self) -> Result<(), StoreError> {
        self.store
            .delete_messages(&self.identity_key, &self.chat_id)
            .await?;
        self.store
            .delete_thread(&self.identity_key, &self.chat_id)
            .await?;
        log::info!("deleted thread {} and its messages", self.chat_id);
        Ok(())
    }

    /// Abandon the request; nothing was touched.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Sender};

    #[tokio::test]
    async fn blank_rename_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        store.create_thread("k", "c").await.unwrap();
        let item = ThreadItem::new(store.clone(), "k", "c");
        item.rename("   ").await.unwrap();
        assert_eq!(store.list_threads("k").await.unwrap()[0].name, None);
    }

    #[tokio::test]
    async fn rename_updates_the_name_only() {
        let store = Arc::new(MemoryStore::new());
        store.create_thread("k", "abc123xyz9").await.unwrap();
        store
            .append_message("k", "abc123xyz9", "m1", Sender::User, "hi")
            .await
            .unwrap();
        let item = ThreadItem::new(store.clone(), "k", "abc123xyz9");
        item.rename("Morning check-in").await.unwrap();

        let threads = store.list_threads("k").await.unwrap();
        assert_eq!(threads[0].name.as_deref(), Some("Morning check-in"));
        assert_eq!(threads[0].display_name(), "Morning check-in");
        let messages = store.list_messages("k", "abc123xyz9").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, "hi");
    }

    #[tokio::test]
    async fn cancelled_delete_touches_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.create_thread("k", "c").await.unwrap();
        let item = ThreadItem::new(store.clone(), "k", "c");
        item.request_delete().cancel();
        assert_eq!(store.list_threads("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_delete_removes_thread_and_descendants() {
        let store = Arc::new(MemoryStore::new());
        store.create_thread("k", "c").await.unwrap();
        store
            .append_message("k", "c", "m1", Sender::User, "hi")
            .await
            .unwrap();
        store
            .append_message("k", "c", "m2", Sender::Bot, "hello")
            .await
            .unwrap();

        let item = ThreadItem::new(store.clone(), "k", "c");
        item.request_delete().confirm().await.unwrap();

        assert!(store.list_threads("k").await.unwrap().is_empty());
        assert!(store.list_messages("k", "c").await.unwrap().is_empty());
    }
}
