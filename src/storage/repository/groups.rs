// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Group repository.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::memberships::{insert_membership, member_ids};
use super::users::User;
use crate::storage::database::{
    encode, next_id, require_row, scan_rows, Database, GROUPS, GROUP_MEMBERSHIPS, USERS,
};
use crate::storage::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    pub created_at: DateTime<Utc>,
}

impl crate::auth::OwnedResource for Group {
    fn owner_id(&self) -> u64 {
        self.owner_id
    }
}

#[derive(Debug, Clone)]
pub struct CreateGroup {
    pub name: String,
    pub owner_id: u64,
}

#[derive(Debug, Clone)]
pub struct UpdateGroup {
    pub name: String,
}

pub struct GroupRepository<'a> {
    db: &'a Database,
}

impl<'a> GroupRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a group owned by an existing user.
    pub fn create(&self, input: &CreateGroup) -> StoreResult<Group> {
        let name = validate_name(&input.name)?;

        self.db.transaction(|txn| {
            let users = txn.open_table(USERS)?;
            let _: User = require_row(&users, input.owner_id, "User")?;

            let group = Group {
                id: next_id(txn, "groups")?,
                name: name.to_string(),
                owner_id: input.owner_id,
                created_at: Utc::now(),
            };
            let mut groups = txn.open_table(GROUPS)?;
            groups.insert(group.id, encode(&group)?.as_slice())?;

            tracing::info!(group_id = group.id, owner_id = group.owner_id, "Group created");
            Ok(group)
        })
    }

    pub fn get(&self, group_id: u64) -> StoreResult<Group> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(GROUPS)?;
        require_row(&groups, group_id, "Group")
    }

    pub fn update(&self, group_id: u64, input: &UpdateGroup) -> StoreResult<Group> {
        let name = validate_name(&input.name)?;

        self.db.transaction(|txn| {
            let mut groups = txn.open_table(GROUPS)?;
            let mut group: Group = require_row(&groups, group_id, "Group")?;
            group.name = name.to_string();
            groups.insert(group_id, encode(&group)?.as_slice())?;
            Ok(group)
        })
    }

    /// Delete a group and all of its memberships.
    pub fn delete(&self, group_id: u64) -> StoreResult<()> {
        self.db.transaction(|txn| {
            let mut groups = txn.open_table(GROUPS)?;
            let _: Group = require_row(&groups, group_id, "Group")?;
            groups.remove(group_id)?;

            let mut memberships = txn.open_table(GROUP_MEMBERSHIPS)?;
            for user_id in member_ids(&memberships, group_id)? {
                memberships.remove((group_id, user_id))?;
            }

            tracing::info!(group_id, "Group deleted");
            Ok(())
        })
    }

    pub fn list(&self) -> StoreResult<Vec<Group>> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(GROUPS)?;
        scan_rows(&groups)
    }

    pub fn by_owner(&self, owner_id: u64) -> StoreResult<Vec<Group>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|g| g.owner_id == owner_id)
            .collect())
    }

    /// Groups the user belongs to.
    pub fn by_member(&self, user_id: u64) -> StoreResult<Vec<Group>> {
        let read_txn = self.db.begin_read()?;
        let memberships = read_txn.open_table(GROUP_MEMBERSHIPS)?;
        let mut group_ids = Vec::new();
        for entry in memberships.iter()? {
            let (key, _) = entry?;
            let (group_id, member_id) = key.value();
            if member_id == user_id {
                group_ids.push(group_id);
            }
        }

        let groups = read_txn.open_table(GROUPS)?;
        group_ids
            .into_iter()
            .map(|id| require_row(&groups, id, "Group"))
            .collect()
    }

    /// Add many users at once. Existing members are skipped.
    ///
    /// Returns how many memberships were inserted. Runs in one transaction,
    /// so an unknown user id adds nobody.
    pub fn add_members(&self, group_id: u64, user_ids: &[u64]) -> StoreResult<usize> {
        self.db.transaction(|txn| {
            let groups = txn.open_table(GROUPS)?;
            let _: Group = require_row(&groups, group_id, "Group")?;
            let users = txn.open_table(USERS)?;
            let mut memberships = txn.open_table(GROUP_MEMBERSHIPS)?;

            let mut inserted = 0;
            for &user_id in user_ids {
                let _: User = require_row(&users, user_id, "User")?;
                if insert_membership(&mut memberships, group_id, user_id)?.is_some() {
                    inserted += 1;
                }
            }

            tracing::debug!(group_id, inserted, "Group members added");
            Ok(inserted)
        })
    }
}

fn validate_name(name: &str) -> StoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("Group name must not be empty".into()));
    }
    Ok(name)
}
