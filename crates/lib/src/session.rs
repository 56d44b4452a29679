//! Session controller: the in-memory view of the active user's chat session.
//!
//! Mediates between user intent, the completion relay, and the document
//! store. Local edits are applied optimistically and never rolled back; the
//! store's live subscription is the source of truth once a message has been
//! echoed, with duplicates resolved by the stable per-message id. Guest
//! sessions (no identity) keep messages in memory only and never touch the
//! store.

use crate::auth::Identity;
use crate::relay::CompletionRelay;
use crate::store::{DocumentStore, MessageRecord, Sender, ThreadRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// A message in the visible transcript. `timestamp` stays empty until the
/// store echo delivers the server-assigned value.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<MessageRecord> for LocalMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            sender: record.sender,
            text: record.message,
            timestamp: Some(record.timestamp),
        }
    }
}

/// Local session state, exclusively owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub active_thread: Option<String>,
    /// Visible transcript of the active thread, oldest first.
    pub messages: Vec<LocalMessage>,
    /// Known threads, newest first (subscription-driven when identified).
    pub threads: Vec<ThreadRecord>,
    /// Inline-encoded profile photo; None falls back to the placeholder.
    pub profile_photo: Option<String>,
    pub menu_open: bool,
    pub sidebar_open: bool,
    /// Set when a live subscription drops; cleared on the next identity change.
    pub offline: bool,
}

/// Aborts the subscription task when dropped, so replacing a handle is the
/// teardown.
struct SubscriptionGuard(JoinHandle<()>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Default)]
struct Subscriptions {
    threads: Option<SubscriptionGuard>,
    profile: Option<SubscriptionGuard>,
    transcript: Option<SubscriptionGuard>,
}

/// Owns `SessionState` and the live subscriptions; at most one transcript
/// subscription is live at a time.
pub struct SessionController {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn DocumentStore>,
    relay: Arc<dyn CompletionRelay>,
    subs: Mutex<Subscriptions>,
}

impl SessionController {
    pub fn new(store: Arc<dyn DocumentStore>, relay: Arc<dyn CompletionRelay>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            store,
            relay,
            subs: Mutex::new(Subscriptions::default()),
        }
    }

    /// Snapshot of the current local state.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Apply an identity change reported by the identity provider.
    ///
    /// Tears down every live subscription first, then either clears
    /// identity-derived state (sign-out) or starts the thread-list and
    /// profile subscriptions for the new identity. The active thread and its
    /// transcript are always dropped: messages from before the transition
    /// were never persisted under the new identity, so carrying them across
    /// would make an ephemeral transcript look durable.
    pub async fn identify(&self, identity: Option<Identity>) {
        let mut subs = self.subs.lock().await;
        subs.threads = None;
        subs.profile = None;
        subs.transcript = None;
        match identity {
            None => {
                let mut s = self.state.write().await;
                s.identity = None;
                s.active_thread = None;
                s.messages.clear();
                s.threads.clear();
                s.profile_photo = None;
                s.offline = false;
            }
            Some(identity) => {
                let key = identity.key();
                {
                    let mut s = self.state.write().await;
                    s.identity = Some(identity);
                    s.active_thread = None;
                    s.messages.clear();
                    s.offline = false;
                }
                subs.threads = Some(self.spawn_thread_list(key.clone()).await);
                subs.profile = Some(self.spawn_profile(key).await);
            }
        }
    }

    /// Open a fresh thread. The id is generated locally, so the user can
    /// start typing without a round-trip; the durable record is written only
    /// when an identity is present, and a write failure never rolls back the
    /// now-active empty thread.
    pub async fn open_new_thread(&self) -> String {
        let chat_id = uuid::Uuid::new_v4().to_string();
        self.activate_thread(chat_id.clone()).await;
        let identity = self.state.read().await.identity.clone();
        if let Some(identity) = identity {
            if let Err(e) = self.store.create_thread(&identity.key(), &chat_id).await {
                log::warn!("creating thread record failed: {}", e);
            }
        }
        chat_id
    }

    /// Switch the visible transcript to an existing thread.
    pub async fn select_thread(&self, chat_id: &str) {
        self.activate_thread(chat_id.to_string()).await;
    }

    async fn activate_thread(&self, chat_id: String) {
        let identity = {
            let mut s = self.state.write().await;
            s.active_thread = Some(chat_id.clone());
            s.messages.clear();
            s.identity.clone()
        };
        let mut subs = self.subs.lock().await;
        subs.transcript = match identity {
            Some(identity) => Some(self.spawn_transcript(identity.key(), chat_id).await),
            None => None,
        };
    }

    /// Send one message through the completion pipeline.
    ///
    /// No-op when the trimmed text is empty or no thread is active. The user
    /// message is appended optimistically before the relay call; a relay
    /// failure abandons the operation silently (logged, no transcript error).
    /// A reply that lands after the active thread changed is discarded, and
    /// both messages are durably appended only when the identity captured at
    /// send time is still current.
    pub async fn send_message(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let (chat_id, identity) = {
            let s = self.state.read().await;
            match s.active_thread.clone() {
                Some(chat_id) => (chat_id, s.identity.clone()),
                None => return,
            }
        };

        let user_id = uuid::Uuid::new_v4().to_string();
        self.state.write().await.messages.push(LocalMessage {
            id: user_id.clone(),
            sender: Sender::User,
            text: trimmed.to_string(),
            timestamp: None,
        });

        let reply = match self.relay.chat(trimmed).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("relay call failed: {}", e);
                return;
            }
        };

        let bot_id = uuid::Uuid::new_v4().to_string();
        {
            let mut s = self.state.write().await;
            if s.active_thread.as_deref() != Some(chat_id.as_str()) {
                log::debug!("discarding reply for thread {} (no longer active)", chat_id);
                return;
            }
            s.messages.push(LocalMessage {
                id: bot_id.clone(),
                sender: Sender::Bot,
                text: reply.clone(),
                timestamp: None,
            });
            if s.identity != identity {
                // Identity changed mid-flight; do not persist under the old key.
                return;
            }
        }

        if let Some(identity) = identity {
            let key = identity.key();
            if let Err(e) = self
                .store
                .append_message(&key, &chat_id, &user_id, Sender::User, trimmed)
                .await
            {
                log::warn!("saving user message failed: {}", e);
            }
            if let Err(e) = self
                .store
                .append_message(&key, &chat_id, &bot_id, Sender::Bot, &reply)
                .await
            {
                log::warn!("saving bot message failed: {}", e);
            }
        }
    }

    pub async fn set_menu_open(&self, open: bool) {
        self.state.write().await.menu_open = open;
    }

    pub async fn set_sidebar_open(&self, open: bool) {
        self.state.write().await.sidebar_open = open;
    }

    async fn spawn_thread_list(&self, key: String) -> SubscriptionGuard {
        let mut rx = self.store.subscribe_threads(&key).await;
        let state = self.state.clone();
        SubscriptionGuard(tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                state.write().await.threads = snapshot;
                if rx.changed().await.is_err() {
                    log::warn!("thread list subscription dropped");
                    state.write().await.offline = true;
                    break;
                }
            }
        }))
    }

    async fn spawn_profile(&self, key: String) -> SubscriptionGuard {
        let mut rx = self.store.subscribe_profile(&key).await;
        let state = self.state.clone();
        SubscriptionGuard(tokio::spawn(async move {
            loop {
                let photo = rx
                    .borrow_and_update()
                    .as_ref()
                    .map(|p| p.photo.clone())
                    .filter(|p| !p.is_empty());
                state.write().await.profile_photo = photo;
                if rx.changed().await.is_err() {
                    log::warn!("profile subscription dropped");
                    state.write().await.offline = true;
                    break;
                }
            }
        }))
    }

    async fn spawn_transcript(&self, key: String, chat_id: String) -> SubscriptionGuard {
        let mut rx = self.store.subscribe_messages(&key, &chat_id).await;
        let state = self.state.clone();
        SubscriptionGuard(tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                {
                    let mut s = state.write().await;
                    // A stale task must never clobber another thread's view.
                    if s.active_thread.as_deref() == Some(chat_id.as_str()) {
                        let merged = merge_snapshot(&snapshot, &s.messages);
                        s.messages = merged;
                    }
                }
                if rx.changed().await.is_err() {
                    log::warn!("transcript subscription dropped");
                    state.write().await.offline = true;
                    break;
                }
            }
        }))
    }
}

/// Snapshot replace with identity-based dedup: the store snapshot becomes the
/// list, and local optimistic messages it has not echoed yet are re-appended
/// behind it, so one logical message never renders twice.
pub fn merge_snapshot(snapshot: &[MessageRecord], local: &[LocalMessage]) -> Vec<LocalMessage> {
    let mut merged: Vec<LocalMessage> = snapshot.iter().cloned().map(LocalMessage::from).collect();
    for message in local {
        if !snapshot.iter().any(|r| r.id == message.id) {
            merged.push(message.clone());
        }
    }
    merged
}

/// Forward identity-provider state changes into the controller, the way an
/// auth-state listener would. Runs until the provider side is dropped.
pub async fn run_identity_listener(
    controller: Arc<SessionController>,
    mut rx: watch::Receiver<Option<Identity>>,
) {
    loop {
        let identity = rx.borrow_and_update().clone();
        controller.identify(identity).await;
        if rx.changed().await.is_err() {
            break;
        }
    }
}
