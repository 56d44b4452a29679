//! Document store for profiles, chat threads, and messages.
//!
//! The store is hierarchical and schema-less, partitioned per identity:
//! `Profile/{identityKey}`, `Chats/{identityKey}/chatList/{chatId}`, and
//! `Chats/{identityKey}/chatList/{chatId}/messages/{messageId}`. Every write
//! re-delivers a full ordered snapshot to live subscribers (snapshot replace,
//! never incremental patches). `MemoryStore` is the in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Derive the data-partition key for a verified email. The key is used as a
/// document path segment, so `/` is substituted.
pub fn identity_key(email: &str) -> String {
    email.replace('/', "_")
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One chat thread record: `{chatId, name?, createdAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub chat_id: String,
    /// User-assigned display name; absent until the first rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ThreadRecord {
    /// Display name: the assigned name, or the first 10 characters of the id.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => self.chat_id.chars().take(10).collect(),
        }
    }
}

/// One message record: `{id, sender, message, timestamp}`. The id is assigned
/// by the client at creation time so optimistic appends and subscription
/// echoes of the same logical message can be matched; the timestamp is
/// assigned by the store at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Profile record: `{name, photo, email}`. The photo is an inline-encoded
/// image; empty means none set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable owner of profile, thread, and message records.
///
/// Subscriptions hand back `watch` receivers whose value is always the latest
/// full snapshot; a receiver created after writes starts at the current state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_profile(&self, key: &str) -> Result<Option<ProfileRecord>, StoreError>;
    async fn set_profile(&self, key: &str, profile: ProfileRecord) -> Result<(), StoreError>;
    async fn delete_profile(&self, key: &str) -> Result<(), StoreError>;
    async fn subscribe_profile(&self, key: &str) -> watch::Receiver<Option<ProfileRecord>>;

    /// Create a thread record; the store assigns `createdAt`.
    async fn create_thread(&self, key: &str, chat_id: &str) -> Result<ThreadRecord, StoreError>;
    /// Update the display-name field only.
    async fn rename_thread(&self, key: &str, chat_id: &str, name: &str) -> Result<(), StoreError>;
    /// Remove the thread record. Idempotent; does not touch child messages.
    async fn delete_thread(&self, key: &str, chat_id: &str) -> Result<(), StoreError>;
    /// Threads ordered by creation time descending (ties broken by id, descending).
    async fn list_threads(&self, key: &str) -> Result<Vec<ThreadRecord>, StoreError>;
    async fn subscribe_threads(&self, key: &str) -> watch::Receiver<Vec<ThreadRecord>>;

    /// Append a message with a server-assigned timestamp. The id is the
    /// caller's stable message id.
    async fn append_message(
        &self,
        key: &str,
        chat_id: &str,
        id: &str,
        sender: Sender,
        message: &str,
    ) -> Result<MessageRecord, StoreError>;
    /// Messages ordered by timestamp ascending (ties keep arrival order).
    async fn list_messages(&self, key: &str, chat_id: &str) -> Result<Vec<MessageRecord>, StoreError>;
    /// Remove every message under the thread. Idempotent.
    async fn delete_messages(&self, key: &str, chat_id: &str) -> Result<(), StoreError>;
    async fn subscribe_messages(&self, key: &str, chat_id: &str) -> watch::Receiver<Vec<MessageRecord>>;
}

/// Per-identity partition: records plus the live snapshot channels.
struct Tenant {
    profile: Option<ProfileRecord>,
    threads: HashMap<String, ThreadRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
    profile_tx: watch::Sender<Option<ProfileRecord>>,
    threads_tx: watch::Sender<Vec<ThreadRecord>>,
    message_tx: HashMap<String, watch::Sender<Vec<MessageRecord>>>,
}

impl Tenant {
    fn new() -> Self {
        Self {
            profile: None,
            threads: HashMap::new(),
            messages: HashMap::new(),
            profile_tx: watch::channel(None).0,
            threads_tx: watch::channel(Vec::new()).0,
            message_tx: HashMap::new(),
        }
    }

    fn thread_snapshot(&self) -> Vec<ThreadRecord> {
        let mut list: Vec<ThreadRecord> = self.threads.values().cloned().collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.chat_id.cmp(&a.chat_id))
        });
        list
    }

    fn message_snapshot(&self, chat_id: &str) -> Vec<MessageRecord> {
        let mut list = self.messages.get(chat_id).cloned().unwrap_or_default();
        list.sort_by_key(|m| m.timestamp);
        list
    }

    fn publish_threads(&self) {
        self.threads_tx.send_replace(self.thread_snapshot());
    }

    fn publish_messages(&mut self, chat_id: &str) {
        let snapshot = self.message_snapshot(chat_id);
        if let Some(tx) = self.message_tx.get(chat_id) {
            tx.send_replace(snapshot);
        }
    }
}

/// In-memory `DocumentStore` (create, mutate, snapshot-subscribe).
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Tenant>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of identity partitions that have ever been touched. Guest
    /// sessions must leave this at zero.
    pub async fn tenant_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_profile(&self, key: &str) -> Result<Option<ProfileRecord>, StoreError> {
        Ok(self.inner.read().await.get(key).and_then(|t| t.profile.clone()))
    }

    async fn set_profile(&self, key: &str, profile: ProfileRecord) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        tenant.profile = Some(profile.clone());
        tenant.profile_tx.send_replace(Some(profile));
        Ok(())
    }

    async fn delete_profile(&self, key: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if let Some(tenant) = g.get_mut(key) {
            tenant.profile = None;
            tenant.profile_tx.send_replace(None);
        }
        Ok(())
    }

    async fn subscribe_profile(&self, key: &str) -> watch::Receiver<Option<ProfileRecord>> {
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        tenant.profile_tx.send_replace(tenant.profile.clone());
        tenant.profile_tx.subscribe()
    }

    async fn create_thread(&self, key: &str, chat_id: &str) -> Result<ThreadRecord, StoreError> {
        let record = ThreadRecord {
            chat_id: chat_id.to_string(),
            name: None,
            created_at: Utc::now(),
        };
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        tenant.threads.insert(chat_id.to_string(), record.clone());
        tenant.publish_threads();
        Ok(record)
    }

    async fn rename_thread(&self, key: &str, chat_id: &str, name: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        let tenant = g
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("Chats/{}", key)))?;
        let record = tenant
            .threads
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::NotFound(format!("Chats/{}/chatList/{}", key, chat_id)))?;
        record.name = Some(name.to_string());
        tenant.publish_threads();
        Ok(())
    }

    async fn delete_thread(&self, key: &str, chat_id: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if let Some(tenant) = g.get_mut(key) {
            if tenant.threads.remove(chat_id).is_some() {
                tenant.publish_threads();
            }
        }
        Ok(())
    }

    async fn list_threads(&self, key: &str) -> Result<Vec<ThreadRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .get(key)
            .map(|t| t.thread_snapshot())
            .unwrap_or_default())
    }

    async fn subscribe_threads(&self, key: &str) -> watch::Receiver<Vec<ThreadRecord>> {
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        tenant.publish_threads();
        tenant.threads_tx.subscribe()
    }

    async fn append_message(
        &self,
        key: &str,
        chat_id: &str,
        id: &str,
        sender: Sender,
        message: &str,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: id.to_string(),
            sender,
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        tenant
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(record.clone());
        tenant.publish_messages(chat_id);
        Ok(record)
    }

    async fn list_messages(&self, key: &str, chat_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .get(key)
            .map(|t| t.message_snapshot(chat_id))
            .unwrap_or_default())
    }

    async fn delete_messages(&self, key: &str, chat_id: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if let Some(tenant) = g.get_mut(key) {
            if tenant.messages.remove(chat_id).is_some() {
                tenant.publish_messages(chat_id);
            }
        }
        Ok(())
    }

    async fn subscribe_messages(&self, key: &str, chat_id: &str) -> watch::Receiver<Vec<MessageRecord>> {
        let mut g = self.inner.write().await;
        let tenant = g.entry(key.to_string()).or_insert_with(Tenant::new);
        let snapshot = tenant.message_snapshot(chat_id);
        let tx = tenant
            .message_tx
            .entry(chat_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        tx.send_replace(snapshot);
        tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_substitutes_slashes() {
        assert_eq!(identity_key("a@b.com"), "a@b.com");
        assert_eq!(identity_key("odd/address@b.com"), "odd_address@b.com");
    }

    #[test]
    fn display_name_truncates_the_id() {
        let record = ThreadRecord {
            chat_id: "abc123xyz9-rest-of-uuid".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        assert_eq!(record.display_name(), "abc123xyz9");
        let named = ThreadRecord {
            name: Some("Morning check-in".to_string()),
            ..record
        };
        assert_eq!(named.display_name(), "Morning check-in");
    }

    #[tokio::test]
    async fn threads_list_newest_first() {
        let store = MemoryStore::new();
        store.create_thread("k", "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.create_thread("k", "second").await.unwrap();
        let list = store.list_threads("k").await.unwrap();
        assert_eq!(list[0].chat_id, "second");
        assert_eq!(list[1].chat_id, "first");
    }

    #[tokio::test]
    async fn messages_keep_append_order() {
        let store = MemoryStore::new();
        store
            .append_message("k", "c", "m1", Sender::User, "hello")
            .await
            .unwrap();
        store
            .append_message("k", "c", "m2", Sender::Bot, "hi there")
            .await
            .unwrap();
        let list = store.list_messages("k", "c").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "m1");
        assert_eq!(list[1].id, "m2");
        assert!(list[0].timestamp <= list[1].timestamp);
    }

    #[tokio::test]
    async fn subscription_sees_snapshot_replace() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe_messages("k", "c").await;
        assert!(rx.borrow_and_update().is_empty());
        store
            .append_message("k", "c", "m1", Sender::User, "hello")
            .await
            .unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].message, "hello");
    }

    #[tokio::test]
    async fn rename_missing_thread_is_not_found() {
        let store = MemoryStore::new();
        store.create_thread("k", "c").await.unwrap();
        let err = store.rename_thread("k", "nope", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
