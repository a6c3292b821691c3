// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blind signature request/response store.
//!
//! A request is created unsigned, signed exactly once by the poll owner and
//! immutable afterwards. Only unsigned requests are pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::polls::Poll;
use crate::storage::database::{
    encode, next_id, require_row, scan_rows, Database, BLIND_SIGNATURE_REQUESTS, POLLS,
};
use crate::storage::{StoreError, StoreResult};
use crate::voting::crypto::random_hex;

/// Bytes of randomness in a request nonce.
const NONCE_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BlindSignatureRequest {
    pub id: u64,
    pub poll_id: u64,
    pub blinded_message: String,
    /// 256-bit hex nonce
    pub nonce: String,
    pub issued: bool,
    pub blind_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct BlindSignatureRepository<'a> {
    db: &'a Database,
}

impl<'a> BlindSignatureRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, poll_id: u64, blinded_message: &str) -> StoreResult<BlindSignatureRequest> {
        if blinded_message.trim().is_empty() {
            return Err(StoreError::Validation(
                "Blinded message must not be empty".into(),
            ));
        }

        self.db.transaction(|txn| {
            let polls = txn.open_table(POLLS)?;
            let _: Poll = require_row(&polls, poll_id, "Poll")?;

            let request = BlindSignatureRequest {
                id: next_id(txn, "blind_signature_requests")?,
                poll_id,
                blinded_message: blinded_message.to_string(),
                nonce: random_hex(NONCE_BYTES),
                issued: false,
                blind_signature: None,
                created_at: Utc::now(),
            };
            let mut requests = txn.open_table(BLIND_SIGNATURE_REQUESTS)?;
            requests.insert(request.id, encode(&request)?.as_slice())?;
            Ok(request)
        })
    }

    pub fn get(&self, request_id: u64) -> StoreResult<BlindSignatureRequest> {
        let read_txn = self.db.begin_read()?;
        let requests = read_txn.open_table(BLIND_SIGNATURE_REQUESTS)?;
        require_row(&requests, request_id, "Blind signature request")
    }

    /// Attach the signature and mark the request issued. Signing an issued
    /// request is a `Conflict`.
    pub fn sign(&self, request_id: u64, signature: &str) -> StoreResult<BlindSignatureRequest> {
        if signature.trim().is_empty() {
            return Err(StoreError::Validation("Signature must not be empty".into()));
        }

        self.db.transaction(|txn| {
            let mut requests = txn.open_table(BLIND_SIGNATURE_REQUESTS)?;
            let mut request: BlindSignatureRequest =
                require_row(&requests, request_id, "Blind signature request")?;
            if request.issued {
                return Err(StoreError::Conflict(format!(
                    "Blind signature request {request_id} is already signed"
                )));
            }

            request.issued = true;
            request.blind_signature = Some(signature.to_string());
            requests.insert(request_id, encode(&request)?.as_slice())?;

            tracing::info!(request_id, poll_id = request.poll_id, "Blind signature issued");
            Ok(request)
        })
    }

    /// Unsigned requests of a poll, oldest first.
    pub fn pending_by_poll(&self, poll_id: u64) -> StoreResult<Vec<BlindSignatureRequest>> {
        let read_txn = self.db.begin_read()?;
        let requests = read_txn.open_table(BLIND_SIGNATURE_REQUESTS)?;
        let rows: Vec<BlindSignatureRequest> = scan_rows(&requests)?;
        Ok(rows
            .into_iter()
            .filter(|r| r.poll_id == poll_id && !r.issued)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::repository::polls::tests::seed_poll;

    #[test]
    fn lifecycle() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let repo = BlindSignatureRepository::new(&db);

        let first = repo.create(poll.id, "blinded-1").unwrap();
        let second = repo.create(poll.id, "blinded-2").unwrap();
        assert!(!first.issued);
        assert_eq!(first.nonce.len(), NONCE_BYTES * 2);
        assert_ne!(first.nonce, second.nonce);
        assert_eq!(repo.pending_by_poll(poll.id).unwrap().len(), 2);

        let signed = repo.sign(first.id, "sig").unwrap();
        assert!(signed.issued);
        assert_eq!(signed.blind_signature.as_deref(), Some("sig"));
        assert_eq!(repo.get(first.id).unwrap(), signed);

        let pending = repo.pending_by_poll(poll.id).unwrap();
        assert_eq!(pending, vec![second]);
    }

    #[test]
    fn resigning_is_rejected() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let repo = BlindSignatureRepository::new(&db);
        let request = repo.create(poll.id, "blinded").unwrap();

        repo.sign(request.id, "sig").unwrap();
        let err = repo.sign(request.id, "other").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            repo.get(request.id).unwrap().blind_signature.as_deref(),
            Some("sig")
        );
    }

    #[test]
    fn missing_rows() {
        let (db, _dir) = temp_db();
        let repo = BlindSignatureRepository::new(&db);
        assert!(matches!(repo.create(4, "m"), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.sign(4, "s"), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.create(4, " "), Err(StoreError::Validation(_))));
    }
}
