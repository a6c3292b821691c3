// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! Names are unique through the `users_by_name` index, which is checked and
//! written in the same transaction as the user row. Passwords are stored as
//! Argon2id PHC strings.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{
    encode, next_id, read_row, require_row, scan_rows, Database, GROUP_MEMBERSHIPS, USERS,
    USERS_BY_NAME,
};
use crate::storage::{StoreError, StoreResult};

/// User row as persisted. Carries the password hash; never hand it to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub password_hash: String,
    pub organizator: bool,
    pub administrator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    /// May create groups and polls
    pub organizator: bool,
    pub administrator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            organizator: user.organizator,
            administrator: user.administrator,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub password: String,
    pub organizator: bool,
    pub administrator: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub name: String,
    pub organizator: bool,
    pub administrator: bool,
}

/// Repository for user rows.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a user. Fails with `Conflict` when the name is taken.
    pub fn create(&self, input: &CreateUser) -> StoreResult<UserProfile> {
        let name = validate_name(&input.name)?;
        validate_password(&input.password)?;
        let password_hash = hash_password(&input.password)?;

        self.db.transaction(|txn| {
            let mut by_name = txn.open_table(USERS_BY_NAME)?;
            if by_name.get(name)?.is_some() {
                return Err(StoreError::Conflict(format!("User name '{name}' is taken")));
            }

            let now = Utc::now();
            let user = User {
                id: next_id(txn, "users")?,
                name: name.to_string(),
                password_hash,
                organizator: input.organizator,
                administrator: input.administrator,
                created_at: now,
                updated_at: now,
            };

            let mut users = txn.open_table(USERS)?;
            users.insert(user.id, encode(&user)?.as_slice())?;
            by_name.insert(name, user.id)?;

            tracing::info!(user_id = user.id, name = %user.name, "User created");
            Ok(user.into())
        })
    }

    pub fn get(&self, user_id: u64) -> StoreResult<UserProfile> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let user: User = require_row(&users, user_id, "User")?;
        Ok(user.into())
    }

    /// Full row, including the password hash.
    pub fn get_by_name(&self, name: &str) -> StoreResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let by_name = read_txn.open_table(USERS_BY_NAME)?;
        let Some(user_id) = by_name.get(name)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        read_row(&users, user_id)
    }

    /// Check a password. Unknown names verify as `false`.
    pub fn verify_password(&self, name: &str, password: &str) -> StoreResult<bool> {
        Ok(self.authenticate(name, password)?.is_some())
    }

    /// Look up a user by credentials.
    pub fn authenticate(&self, name: &str, password: &str) -> StoreResult<Option<UserProfile>> {
        let Some(user) = self.get_by_name(name)? else {
            return Ok(None);
        };
        if check_password(&user.password_hash, password)? {
            Ok(Some(user.into()))
        } else {
            Ok(None)
        }
    }

    /// Rename a user or change their flags.
    pub fn update(&self, user_id: u64, input: &UpdateUser) -> StoreResult<UserProfile> {
        let name = validate_name(&input.name)?;

        self.db.transaction(|txn| {
            let mut users = txn.open_table(USERS)?;
            let mut by_name = txn.open_table(USERS_BY_NAME)?;
            let mut user: User = require_row(&users, user_id, "User")?;

            if user.name != name {
                if by_name.get(name)?.is_some() {
                    return Err(StoreError::Conflict(format!("User name '{name}' is taken")));
                }
                by_name.remove(user.name.as_str())?;
                by_name.insert(name, user_id)?;
                user.name = name.to_string();
            }
            user.organizator = input.organizator;
            user.administrator = input.administrator;
            user.updated_at = touch(user.updated_at);

            users.insert(user_id, encode(&user)?.as_slice())?;
            Ok(user.into())
        })
    }

    pub fn update_password(&self, user_id: u64, password: &str) -> StoreResult<UserProfile> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.db.transaction(|txn| {
            let mut users = txn.open_table(USERS)?;
            let mut user: User = require_row(&users, user_id, "User")?;
            user.password_hash = password_hash;
            user.updated_at = touch(user.updated_at);
            users.insert(user_id, encode(&user)?.as_slice())?;
            Ok(user.into())
        })
    }

    /// Delete a user along with their group memberships.
    pub fn delete(&self, user_id: u64) -> StoreResult<()> {
        self.db.transaction(|txn| {
            let mut users = txn.open_table(USERS)?;
            let user: User = require_row(&users, user_id, "User")?;
            users.remove(user_id)?;

            let mut by_name = txn.open_table(USERS_BY_NAME)?;
            by_name.remove(user.name.as_str())?;

            let mut memberships = txn.open_table(GROUP_MEMBERSHIPS)?;
            let mut keys = Vec::new();
            for entry in memberships.iter()? {
                let (key, _) = entry?;
                let (group_id, member_id) = key.value();
                if member_id == user_id {
                    keys.push((group_id, member_id));
                }
            }
            for key in keys {
                memberships.remove(key)?;
            }

            tracing::info!(user_id, "User deleted");
            Ok(())
        })
    }

    pub fn list(&self) -> StoreResult<Vec<UserProfile>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let rows: Vec<User> = scan_rows(&users)?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        Ok(users.len()?)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Whether a session snapshot of a user still matches the stored row.
    ///
    /// A deleted user is never latest.
    pub fn is_latest(&self, user_id: u64, updated_at: DateTime<Utc>) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let user: Option<User> = read_row(&users, user_id)?;
        Ok(user.is_some_and(|u| u.updated_at == updated_at))
    }
}

fn validate_name(name: &str) -> StoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("User name must not be empty".into()));
    }
    Ok(name)
}

fn validate_password(password: &str) -> StoreResult<()> {
    if password.is_empty() {
        return Err(StoreError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn check_password(hash: &str, password: &str) -> StoreResult<bool> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Next `updated_at`, strictly after `previous` so freshness checks always
/// notice a write.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
