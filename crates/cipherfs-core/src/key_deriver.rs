use async_trait::async_trait;
use cipherfs_crypto::ClientHalf;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::errors::KeyError;
use crate::types::{BlockContext, CollectionId, KeyGen, KeyMetadata, UserId};

/// Resolves the caller-held half of a block key.
///
/// A capability, not a store: the answer depends only on the caller's
/// currently unlocked key material and the metadata passed in.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyDeriver: Send + Sync {
    async fn client_half(
        &self,
        md: &KeyMetadata,
        key_gen: KeyGen,
        context: &BlockContext,
    ) -> Result<ClientHalf, KeyError>;
}

/// In-process set of unlocked client halves, one per collection and key
/// generation
#[derive(Default)]
pub struct Keyring {
    owner: Option<UserId>,
    keys: RwLock<HashMap<(CollectionId, KeyGen), ClientHalf>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyring that additionally requires `owner` to be a reader or writer
    /// of the collection
    pub fn for_user(owner: UserId) -> Self {
        Keyring {
            owner: Some(owner),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn unlock(&self, collection: CollectionId, key_gen: KeyGen, half: ClientHalf) {
        debug!(collection = %collection, key_gen = key_gen.0, "unlocked client half");
        self.keys.write().insert((collection, key_gen), half);
    }

    /// Forget every unlocked generation of a collection; returns how many were dropped
    pub fn lock_collection(&self, collection: &CollectionId) -> usize {
        let mut keys = self.keys.write();
        let before = keys.len();
        keys.retain(|(c, _), _| c != collection);
        before - keys.len()
    }

    pub fn is_unlocked(&self, collection: &CollectionId, key_gen: KeyGen) -> bool {
        self.keys.read().contains_key(&(*collection, key_gen))
    }

    fn check_membership(&self, md: &KeyMetadata) -> Result<(), KeyError> {
        match &self.owner {
            Some(owner) if !md.readers.contains(owner) && !md.writers.contains(owner) => {
                Err(KeyError::NotAuthorized(format!(
                    "{} is neither reader nor writer of {}",
                    owner, md.collection_id
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KeyDeriver for Keyring {
    async fn client_half(
        &self,
        md: &KeyMetadata,
        key_gen: KeyGen,
        _context: &BlockContext,
    ) -> Result<ClientHalf, KeyError> {
        if !md.covers(key_gen) {
            warn!(
                collection = %md.collection_id,
                key_gen = key_gen.0,
                latest = md.latest_key_gen.0,
                "key generation outside metadata"
            );
            return Err(KeyError::UnknownKeyGen {
                key_gen,
                latest: md.latest_key_gen,
            });
        }
        self.check_membership(md)?;

        self.keys
            .read()
            .get(&(md.collection_id, key_gen))
            .cloned()
            .ok_or(KeyError::Locked(key_gen))
    }
}
