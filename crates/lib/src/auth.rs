//! Identity provider: email/password accounts gated on email verification.
//!
//! Sign-up triggers a verification mail and signs the session out immediately;
//! sign-in rejects unverified accounts. Account deletion requires a recent
//! sign-in. `MemoryIdentityProvider` is the in-process implementation; the
//! outbox records mail events instead of sending anything.

use crate::store::{identity_key, DocumentStore, ProfileRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

const MIN_PASSWORD_LEN: usize = 6;

/// How recently a session must have signed in for destructive operations.
const RECENT_LOGIN_WINDOW_SECS: i64 = 300;

/// A signed-in account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }

    /// Stable key used for data partitioning (document path segment).
    pub fn key(&self) -> String {
        identity_key(&self.email)
    }
}

/// Identity errors, each carrying its fixed user-facing message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("an account with this email already exists")]
    EmailInUse,
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("please verify your email before logging in")]
    EmailNotVerified,
    #[error("no account found for this email")]
    UnknownEmail,
    #[error("please log in again before deleting your account")]
    RequiresRecentLogin,
}

/// Mail the provider would have sent (verification link, reset link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailEvent {
    Verification { email: String },
    PasswordReset { email: String },
}

/// External identity provider contract.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account, trigger a verification mail, and sign the session
    /// out immediately. The account stays unusable until verified.
    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError>;
    /// Sign in; unverified accounts are signed out again and rejected.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
    async fn sign_out(&self);
    async fn current(&self) -> Option<Identity>;
    /// Effect of the emailed verification link.
    async fn verify_email(&self, email: &str) -> Result<(), AuthError>;
    async fn resend_verification(&self, email: &str) -> Result<(), AuthError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;
    /// Delete the account; requires a recently-authenticated session.
    async fn delete_account(&self, email: &str) -> Result<(), AuthError>;
    /// Auth-state changes, newest state first on subscribe.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

struct Account {
    password: String,
    verified: bool,
    last_sign_in: Option<DateTime<Utc>>,
}

/// In-memory identity provider. Creates the empty profile record on sign-up.
pub struct MemoryIdentityProvider {
    store: Arc<dyn DocumentStore>,
    accounts: RwLock<HashMap<String, Account>>,
    current_tx: watch::Sender<Option<Identity>>,
    outbox: RwLock<Vec<MailEvent>>,
    recent_window: Duration,
}

impl MemoryIdentityProvider {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_recent_window(store, Duration::seconds(RECENT_LOGIN_WINDOW_SECS))
    }

    pub fn with_recent_window(store: Arc<dyn DocumentStore>, recent_window: Duration) -> Self {
        Self {
            store,
            accounts: RwLock::new(HashMap::new()),
            current_tx: watch::channel(None).0,
            outbox: RwLock::new(Vec::new()),
            recent_window,
        }
    }

    /// Mail events recorded so far (verification and reset links).
    pub async fn outbox(&self) -> Vec<MailEvent> {
        self.outbox.read().await.clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(email) {
                return Err(AuthError::EmailInUse);
            }
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    verified: false,
                    last_sign_in: None,
                },
            );
        }
        if let Err(e) = self
            .store
            .set_profile(
                &identity_key(email),
                ProfileRecord {
                    email: email.to_string(),
                    ..ProfileRecord::default()
                },
            )
            .await
        {
            log::warn!("creating profile on sign-up failed: {}", e);
        }
        self.outbox.write().await.push(MailEvent::Verification {
            email: email.to_string(),
        });
        // Never leave an unverified account signed in.
        self.current_tx.send_replace(None);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(email)
            .ok_or(AuthError::InvalidCredentials)?;
        if account.password != password {
            return Err(AuthError::InvalidCredentials);
        }
        if !account.verified {
            self.current_tx.send_replace(None);
            return Err(AuthError::EmailNotVerified);
        }
        account.last_sign_in = Some(Utc::now());
        let identity = Identity::new(email);
        self.current_tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.current_tx.send_replace(None);
    }

    async fn current(&self) -> Option<Identity> {
        self.current_tx.borrow().clone()
    }

    async fn verify_email(&self, email: &str) -> Result<(), AuthError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(email).ok_or(AuthError::UnknownEmail)?;
        account.verified = true;
        Ok(())
    }

    async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let accounts = self.accounts.read().await;
        let account = accounts.get(email).ok_or(AuthError::UnknownEmail)?;
        if account.verified {
            return Ok(());
        }
        self.outbox.write().await.push(MailEvent::Verification {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if !self.accounts.read().await.contains_key(email) {
            return Err(AuthError::UnknownEmail);
        }
        self.outbox.write().await.push(MailEvent::PasswordReset {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn delete_account(&self, email: &str) -> Result<(), AuthError> {
        let signed_in = self
            .current_tx
            .borrow()
            .as_ref()
            .map(|i| i.email == email)
            .unwrap_or(false);
        if !signed_in {
            return Err(AuthError::RequiresRecentLogin);
        }
        {
            let accounts = self.accounts.read().await;
            let account = accounts.get(email).ok_or(AuthError::UnknownEmail)?;
            let recent = account
                .last_sign_in
                .map(|t| Utc::now() - t < self.recent_window)
                .unwrap_or(false);
            if !recent {
                return Err(AuthError::RequiresRecentLogin);
            }
        }
        self.accounts.write().await.remove(email);
        self.current_tx.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn provider() -> MemoryIdentityProvider {
        MemoryIdentityProvider::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn sign_up_requires_six_char_password() {
        let p = provider();
        assert_eq!(
            p.sign_up("a@b.com", "abcde").await.unwrap_err(),
            AuthError::WeakPassword
        );
        assert!(p.sign_up("a@b.com", "abcdef").await.is_ok());
    }

    #[tokio::test]
    async fn sign_up_records_verification_and_signs_out() {
        let p = provider();
        p.sign_up("a@b.com", "abcdef").await.unwrap();
        assert_eq!(
            p.outbox().await,
            vec![MailEvent::Verification {
                email: "a@b.com".to_string()
            }]
        );
        assert!(p.current().await.is_none());
    }

    #[tokio::test]
    async fn unverified_sign_in_is_rejected_and_signed_out() {
        let p = provider();
        p.sign_up("a@b.com", "abcdef").await.unwrap();
        assert_eq!(
            p.sign_in("a@b.com", "abcdef").await.unwrap_err(),
            AuthError::EmailNotVerified
        );
        assert!(p.current().await.is_none());

        p.verify_email("a@b.com").await.unwrap();
        let identity = p.sign_in("a@b.com", "abcdef").await.unwrap();
        assert_eq!(identity.email, "a@b.com");
        assert_eq!(p.current().await, Some(identity));
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let p = provider();
        p.sign_up("a@b.com", "abcdef").await.unwrap();
        p.verify_email("a@b.com").await.unwrap();
        assert_eq!(
            p.sign_in("a@b.com", "wrong!").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            p.sign_in("nobody@b.com", "abcdef").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn delete_requires_recent_sign_in() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let p = MemoryIdentityProvider::with_recent_window(store, Duration::zero());
        p.sign_up("a@b.com", "abcdef").await.unwrap();
        p.verify_email("a@b.com").await.unwrap();
        p.sign_in("a@b.com", "abcdef").await.unwrap();
        // Zero window: even an immediate delete counts as stale.
        assert_eq!(
            p.delete_account("a@b.com").await.unwrap_err(),
            AuthError::RequiresRecentLogin
        );
    }

    #[tokio::test]
    async fn delete_with_recent_session_removes_the_account() {
        let p = provider();
        p.sign_up("a@b.com", "abcdef").await.unwrap();
        p.verify_email("a@b.com").await.unwrap();
        p.sign_in("a@b.com", "abcdef").await.unwrap();
        p.delete_account("a@b.com").await.unwrap();
        assert!(p.current().await.is_none());
        assert_eq!(
            p.sign_in("a@b.com", "abcdef").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }
}
