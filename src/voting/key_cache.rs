// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of parsed poll verification keys.
//!
//! A poll's keypair never changes once generated, so a parsed key can be
//! reused until the poll is deleted.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use rsa::RsaPublicKey;

use super::crypto::parse_public_key;
use crate::storage::{Database, PollRepository, StoreError, StoreResult};

/// Default number of cached keys.
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 256;

pub struct VerificationKeyCache {
    keys: Mutex<LruCache<u64, RsaPublicKey>>,
}

impl VerificationKeyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keys: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The poll's verification key, loaded from the database on a miss.
    ///
    /// `NotFound` when the poll is missing or has no keypair yet.
    pub fn get_or_load(&self, db: &Database, poll_id: u64) -> StoreResult<RsaPublicKey> {
        if let Some(key) = self.cached(poll_id) {
            return Ok(key);
        }

        let poll = PollRepository::new(db).get(poll_id)?;
        let pem = poll.verification_key.ok_or_else(|| {
            StoreError::NotFound(format!("Verification key of poll {poll_id}"))
        })?;
        let key = parse_public_key(&pem)?;

        if let Ok(mut keys) = self.keys.lock() {
            keys.put(poll_id, key.clone());
        }
        tracing::debug!(poll_id, "Verification key cached");
        Ok(key)
    }

    /// Forget a poll's key, e.g. after the poll is deleted.
    pub fn invalidate(&self, poll_id: u64) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.pop(&poll_id);
        }
    }

    fn cached(&self, poll_id: u64) -> Option<RsaPublicKey> {
        self.keys.lock().ok()?.get(&poll_id).cloned()
    }
}

impl Default for VerificationKeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::repository::polls::tests::seed_poll;

    #[test]
    fn loads_then_serves_from_cache() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let polls = PollRepository::new(&db);
        let keys = polls.ensure_signing_keys(poll.id).unwrap();
        let cache = VerificationKeyCache::new(4);

        let loaded = cache.get_or_load(&db, poll.id).unwrap();
        assert_eq!(loaded, parse_public_key(&keys.verification_key).unwrap());

        // Served from memory even after the row is gone
        polls.delete(poll.id).unwrap();
        assert!(cache.get_or_load(&db, poll.id).is_ok());

        cache.invalidate(poll.id);
        assert!(matches!(
            cache.get_or_load(&db, poll.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn poll_without_keys_is_not_found() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let err = VerificationKeyCache::default()
            .get_or_load(&db, poll.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
