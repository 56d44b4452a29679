//! Profile editing and account-data removal.

use crate::store::{identity_key, DocumentStore, ProfileRecord, StoreError};
use base64::Engine as _;
use std::sync::Arc;

/// Upper bound on the decoded size of an inline profile photo.
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("image must be smaller than 1MB")]
    PhotoTooLarge,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Inline-encode a photo for storage in the profile record.
pub fn encode_photo(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Size check on the already-encoded form (decoded size computed from the
/// encoded length and padding, so the raw bytes need not be in hand).
pub fn photo_within_cap(encoded: &str) -> bool {
    let padding = encoded.bytes().rev().take_while(|b| *b == b'=').count();
    let decoded = (encoded.len() / 4) * 3;
    decoded.saturating_sub(padding) <= MAX_PHOTO_BYTES
}

/// Update name and/or photo, keeping every field not being changed. The
/// profile document is created if missing, with the email filled in.
pub async fn save_profile(
    store: &Arc<dyn DocumentStore>,
    email: &str,
    name: Option<&str>,
    photo: Option<&str>,
) -> Result<(), ProfileError> {
    if let Some(photo) = photo {
        if !photo_within_cap(photo) {
            return Err(ProfileError::PhotoTooLarge);
        }
    }
    let key = identity_key(email);
    let mut profile = store.get_profile(&key).await?.unwrap_or_default();
    profile.email = email.to_string();
    if let Some(name) = name {
        profile.name = name.to_string();
    }
    if let Some(photo) = photo {
        profile.photo = photo.to_string();
    }
    store.set_profile(&key, profile).await?;
    Ok(())
}

/// Remove everything stored under an identity: the profile, then every
/// thread with its messages (children before the thread record, as in a
/// single-thread delete). Called after the identity provider has removed
/// the account itself.
pub async fn delete_account_data(
    store: &Arc<dyn DocumentStore>,
    email: &str,
) -> Result<(), StoreError> {
    let key = identity_key(email);
    if let Err(e) = store.delete_profile(&key).await {
        log::warn!("deleting profile for {} failed: {}", key, e);
    }
    for thread in store.list_threads(&key).await? {
        store.delete_messages(&key, &thread.chat_id).await?;
        store.delete_thread(&key, &thread.chat_id).await?;
    }
    log::info!("removed all data for {}", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Sender};

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn photo_cap_is_one_megabyte_decoded() {
        let small = encode_photo(&vec![0u8; 1024]);
        assert!(photo_within_cap(&small));
        let exact = encode_photo(&vec![0u8; MAX_PHOTO_BYTES]);
        assert!(photo_within_cap(&exact));
        let big = encode_photo(&vec![0u8; MAX_PHOTO_BYTES + 3]);
        assert!(!photo_within_cap(&big));
    }

    #[tokio::test]
    async fn oversized_photo_is_rejected_without_writing() {
        let store = store();
        let big = encode_photo(&vec![0u8; MAX_PHOTO_BYTES + 3]);
        let err = save_profile(&store, "a@b.com", None, Some(&big))
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::PhotoTooLarge));
        assert!(store.get_profile("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_merges_into_the_existing_profile() {
        let store = store();
        save_profile(&store, "a@b.com", Some("Asha"), None)
            .await
            .unwrap();
        let photo = encode_photo(b"png bytes");
        save_profile(&store, "a@b.com", None, Some(&photo))
            .await
            .unwrap();

        let profile = store.get_profile("a@b.com").await.unwrap().unwrap();
        assert_eq!(profile.name, "Asha");
        assert_eq!(profile.photo, photo);
        assert_eq!(profile.email, "a@b.com");
    }

    #[tokio::test]
    async fn delete_account_data_removes_everything() {
        let store = store();
        save_profile(&store, "a@b.com", Some("Asha"), None)
            .await
            .unwrap();
        store.create_thread("a@b.com", "c1").await.unwrap();
        store.create_thread("a@b.com", "c2").await.unwrap();
        store
            .append_message("a@b.com", "c1", "m1", Sender::User, "hi")
            .await
            .unwrap();

        delete_account_data(&store, "a@b.com").await.unwrap();

        assert!(store.get_profile("a@b.com").await.unwrap().is_none());
        assert!(store.list_threads("a@b.com").await.unwrap().is_empty());
        assert!(store.list_messages("a@b.com", "c1").await.unwrap().is_empty());
    }
}
