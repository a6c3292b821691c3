// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Voting token issuance.
//!
//! Each token is 256 random bits signed with the poll's private key. The
//! issuer stores nothing about the tokens it hands out, so a later ballot
//! cannot be traced back to an issuance through the database.
//!
//! The scheme is only nominally blind: the server signs the plaintext token
//! and could remember it. Unlinkability rests on the issuer not recording
//! what it returns.

use super::crypto::{random_hex, sha256_hex, PemSigner};
use super::token::{IssuedToken, TokenBundle};
use crate::storage::{Database, PollRepository, StoreError, StoreResult};

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Upper bound on one issuance batch.
pub const MAX_TOKENS_PER_BATCH: usize = 1000;

pub struct TokenIssuer<'a> {
    db: &'a Database,
}

impl<'a> TokenIssuer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Issue `count` signed tokens for a poll, generating the poll's
    /// signing keypair on first use.
    pub fn generate_tokens(&self, poll_id: u64, count: usize) -> StoreResult<Vec<IssuedToken>> {
        if count > MAX_TOKENS_PER_BATCH {
            return Err(StoreError::Validation(format!(
                "At most {MAX_TOKENS_PER_BATCH} tokens can be issued at once"
            )));
        }

        let keys = PollRepository::new(self.db).ensure_signing_keys(poll_id)?;
        let signer = PemSigner::from_pkcs8_pem(&keys.signing_key)?;

        let mut tokens = Vec::with_capacity(count);
        for _ in 0..count {
            let token = random_hex(TOKEN_BYTES);
            let token_hash = sha256_hex(token.as_bytes());
            let signature = signer.sign(token.as_bytes())?;
            let token_data = TokenBundle::new(token, &signature, poll_id)
                .encode()
                .map_err(|e| StoreError::Validation(e.to_string()))?;
            tokens.push(IssuedToken {
                token_hash,
                token_data,
            });
        }

        tracing::info!(poll_id, count, "Voting tokens issued");
        Ok(tokens)
    }
}
