// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Logins, user and poll administration, token issuance and every ballot
//! are appended to the `audit_logs` table. Token material never reaches
//! the log: sensitive metadata keys are stripped before the entry is
//! written. Logging failures are reported through `tracing` and never fail
//! the operation being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{encode, next_id, scan_rows, Database, AUDIT_LOGS};
use super::StoreResult;

/// Top-level metadata keys removed before an entry is stored.
pub const REDACTED_FIELDS: [&str; 4] = ["token", "signature", "tokenHash", "token_hash"];

/// Default page size for [`AuditRepository::query`].
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Auth events
    LoginSucceeded,
    LoginFailed,
    SessionInvalidated,

    // Directory events
    UserCreated,
    GroupCreated,
    PollCreated,

    // Anonymous voting events
    TokensIssued,
    VoterKeysIssued,
    BlindSignatureRequested,
    BlindSignatureIssued,

    // Ballots
    VoteCast,
    TokenVoteCast,
    AnonymousVoteCast,
}

/// An event to be logged.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub entity_type: String,
    pub entity_id: Option<String>,
    /// Acting user, if any
    pub user_id: Option<u64>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, entity_type: impl Into<String>) -> Self {
        Self {
            event_type,
            entity_type: entity_type.into(),
            entity_id: None,
            user_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl ToString) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A stored audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AuditLogEntry {
    pub id: u64,
    pub event_type: AuditEventType,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub user_id: Option<u64>,
    /// Redacted metadata
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Filters for [`AuditRepository::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.event_type.is_none_or(|t| t == entry.event_type)
            && self
                .entity_type
                .as_deref()
                .is_none_or(|t| t == entry.entity_type)
            && self
                .entity_id
                .as_deref()
                .is_none_or(|id| entry.entity_id.as_deref() == Some(id))
            && self.start.is_none_or(|start| entry.created_at >= start)
            && self.end.is_none_or(|end| entry.created_at <= end)
    }
}

/// Strip redacted keys from a metadata object. Other values pass through.
pub fn redact(metadata: serde_json::Value) -> serde_json::Value {
    match metadata {
        serde_json::Value::Object(mut map) => {
            for field in REDACTED_FIELDS {
                map.remove(field);
            }
            serde_json::Value::Object(map)
        }
        other => other,
    }
}

/// Repository for audit log entries.
pub struct AuditRepository<'a> {
    db: &'a Database,
}

impl<'a> AuditRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an event. Returns the entry id, or `None` if it could not be
    /// written; the failure is logged and swallowed.
    pub fn log(&self, event: &AuditEvent) -> Option<u64> {
        match self.append(event) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_type = ?event.event_type,
                    entity_type = %event.entity_type,
                    "Failed to write audit log entry"
                );
                None
            }
        }
    }

    fn append(&self, event: &AuditEvent) -> StoreResult<u64> {
        self.db.transaction(|txn| {
            let entry = AuditLogEntry {
                id: next_id(txn, "audit_logs")?,
                event_type: event.event_type,
                entity_type: event.entity_type.clone(),
                entity_id: event.entity_id.clone(),
                user_id: event.user_id,
                metadata: redact(event.metadata.clone()),
                created_at: Utc::now(),
            };
            let mut table = txn.open_table(AUDIT_LOGS)?;
            table.insert(entry.id, encode(&entry)?.as_slice())?;
            Ok(entry.id)
        })
    }

    /// Entries matching `filter`, newest first.
    pub fn query(
        &self,
        filter: &AuditFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOGS)?;
        let mut entries: Vec<AuditLogEntry> = scan_rows(&table)?;
        entries.retain(|entry| filter.matches(entry));
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }
}

/// Helper macro for logging audit events.
#[macro_export]
macro_rules! audit_log {
    ($db:expr, $event_type:expr, $entity_type:expr, $entity_id:expr) => {{
        let repo = $crate::storage::AuditRepository::new($db);
        let event =
            $crate::storage::AuditEvent::new($event_type, $entity_type).with_entity_id($entity_id);
        let _ = repo.log(&event);
    }};
    ($db:expr, $event_type:expr, $entity_type:expr, $entity_id:expr, $user:expr) => {{
        let repo = $crate::storage::AuditRepository::new($db);
        let event = $crate::storage::AuditEvent::new($event_type, $entity_type)
            .with_entity_id($entity_id)
            .with_user($user.user_id);
        let _ = repo.log(&event);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn redaction_strips_token_material() {
        let (db, _dir) = temp_db();
        let repo = AuditRepository::new(&db);

        let id = repo
            .log(
                &AuditEvent::new(AuditEventType::TokenVoteCast, "poll")
                    .with_entity_id(3)
                    .with_metadata(json!({
                        "token": "abc",
                        "signature": "sig",
                        "tokenHash": "h1",
                        "token_hash": "h2",
                        "options": 1,
                    })),
            )
            .unwrap();

        let entries = repo.query(&AuditFilter::default(), 10, 0).unwrap();
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].metadata, json!({ "options": 1 }));
        assert_eq!(entries[0].entity_id.as_deref(), Some("3"));
    }

    #[test]
    fn redact_leaves_non_objects_alone() {
        assert_eq!(redact(json!(["token"])), json!(["token"]));
        assert_eq!(redact(serde_json::Value::Null), serde_json::Value::Null);
    }

    #[test]
    fn query_filters_and_pages_newest_first() {
        let (db, _dir) = temp_db();
        let repo = AuditRepository::new(&db);
        for poll_id in 1..=3 {
            repo.log(&AuditEvent::new(AuditEventType::PollCreated, "poll").with_entity_id(poll_id));
        }
        repo.log(&AuditEvent::new(AuditEventType::UserCreated, "user").with_entity_id(1));

        let polls = AuditFilter {
            event_type: Some(AuditEventType::PollCreated),
            ..Default::default()
        };
        let ids: Vec<_> = repo
            .query(&polls, DEFAULT_QUERY_LIMIT, 0)
            .unwrap()
            .into_iter()
            .map(|e| e.entity_id.unwrap())
            .collect();
        assert_eq!(ids, vec!["3", "2", "1"]);

        let page = repo.query(&polls, 1, 1).unwrap();
        assert_eq!(page[0].entity_id.as_deref(), Some("2"));

        let user_one = AuditFilter {
            entity_type: Some("user".into()),
            entity_id: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(repo.query(&user_one, 10, 0).unwrap().len(), 1);

        let future = AuditFilter {
            start: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(repo.query(&future, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn macro_logs_with_user() {
        let (db, _dir) = temp_db();
        struct Actor {
            user_id: u64,
        }
        let actor = Actor { user_id: 7 };
        crate::audit_log!(&db, AuditEventType::GroupCreated, "group", 2, actor);

        let entries = AuditRepository::new(&db)
            .query(&AuditFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, Some(7));
        assert_eq!(entries[0].event_type, AuditEventType::GroupCreated);
    }
}
