// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Voting token verification and redemption.

use super::crypto::verify;
use super::key_cache::VerificationKeyCache;
use super::token::TokenBundle;
use crate::storage::{AddOutcome, Database, StoreError, StoreResult, UsedTokenGuard, UsedVotingToken};

/// A token whose signature checked out and that was unspent when checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub poll_id: u64,
    pub token_hash: String,
}

pub struct TokenRedeemer<'a> {
    db: &'a Database,
    keys: &'a VerificationKeyCache,
}

impl<'a> TokenRedeemer<'a> {
    pub fn new(db: &'a Database, keys: &'a VerificationKeyCache) -> Self {
        Self { db, keys }
    }

    /// Decode and check token data without spending it.
    ///
    /// Spent tokens are rejected before the signature is checked. A spend
    /// can still race this check; the used-token insert settles it.
    pub fn verify(&self, token_data: &str) -> StoreResult<VerifiedToken> {
        let bundle = TokenBundle::decode(token_data)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let token_hash = bundle.token_hash();

        if UsedTokenGuard::new(self.db).is_used(bundle.poll_id, &token_hash)? {
            return Err(StoreError::Conflict(
                "Voting token has already been used".into(),
            ));
        }

        let signature = bundle
            .signature_bytes()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let public_key = self.keys.get_or_load(self.db, bundle.poll_id)?;
        if !verify(&public_key, bundle.token.as_bytes(), &signature) {
            tracing::warn!(poll_id = bundle.poll_id, "Voting token signature rejected");
            return Err(StoreError::Validation(
                "Voting token signature is invalid".into(),
            ));
        }

        Ok(VerifiedToken {
            poll_id: bundle.poll_id,
            token_hash,
        })
    }

    /// Verify a token and mark it spent.
    pub fn redeem(&self, token_data: &str) -> StoreResult<UsedVotingToken> {
        let verified = self.verify(token_data)?;
        match UsedTokenGuard::new(self.db).add(verified.poll_id, &verified.token_hash)? {
            AddOutcome::Recorded(record) => Ok(record),
            AddOutcome::AlreadyUsed => Err(StoreError::Conflict(
                "Voting token has already been used".into(),
            )),
        }
    }
}
