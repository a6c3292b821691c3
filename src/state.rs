// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use crate::{auth::SessionStore, storage::Database, voting::VerificationKeyCache};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub verification_keys: Arc<VerificationKeyCache>,
}

impl AppState {
    pub fn new(db: Database, session_ttl: Duration) -> Self {
        Self {
            db: Arc::new(db),
            sessions: SessionStore::new(session_ttl),
            verification_keys: Arc::new(VerificationKeyCache::default()),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
    let (db, dir) = crate::storage::database::temp_db();
    (AppState::new(db, Duration::from_secs(3600)), dir)
}
