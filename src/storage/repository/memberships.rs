// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Group membership repository.
//!
//! Memberships are keyed by `(group_id, user_id)`, so a group's members form
//! one contiguous key range.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::users::User;
use crate::storage::database::{
    decode, encode, read_row, require_row, Database, GROUPS, GROUP_MEMBERSHIPS, USERS,
};
use crate::storage::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_id: u64,
    pub user_id: u64,
    pub joined_at: DateTime<Utc>,
}

/// A member as listed by `members_of`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MemberSummary {
    pub id: u64,
    pub name: String,
    pub organizator: bool,
    pub administrator: bool,
}

pub struct MembershipRepository<'a> {
    db: &'a Database,
}

impl<'a> MembershipRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Add a user to a group. Returns `None` if they already belong to it.
    pub fn add_member(&self, user_id: u64, group_id: u64) -> StoreResult<Option<GroupMembership>> {
        self.db.transaction(|txn| {
            check_group_and_user(txn, group_id, user_id)?;
            let mut memberships = txn.open_table(GROUP_MEMBERSHIPS)?;
            insert_membership(&mut memberships, group_id, user_id)
        })
    }

    /// Remove a user from a group. Returns the removed membership, if any.
    pub fn remove_member(
        &self,
        user_id: u64,
        group_id: u64,
    ) -> StoreResult<Option<GroupMembership>> {
        self.db.transaction(|txn| {
            let mut memberships = txn.open_table(GROUP_MEMBERSHIPS)?;
            let removed = match memberships.remove((group_id, user_id))? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            Ok(removed)
        })
    }

    /// Members of a group, in user id order. Unknown groups have no members.
    pub fn members_of(&self, group_id: u64) -> StoreResult<Vec<MemberSummary>> {
        let read_txn = self.db.begin_read()?;
        let memberships = read_txn.open_table(GROUP_MEMBERSHIPS)?;
        let users = read_txn.open_table(USERS)?;

        let mut members = Vec::new();
        for user_id in member_ids(&memberships, group_id)? {
            let user: Option<User> = read_row(&users, user_id)?;
            if let Some(user) = user {
                members.push(MemberSummary {
                    id: user.id,
                    name: user.name,
                    organizator: user.organizator,
                    administrator: user.administrator,
                });
            }
        }
        Ok(members)
    }

    pub fn is_member(&self, user_id: u64, group_id: u64) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let memberships = read_txn.open_table(GROUP_MEMBERSHIPS)?;
        Ok(memberships.get((group_id, user_id))?.is_some())
    }
}

/// Ids of every member of `group_id`, ascending.
pub(crate) fn member_ids<Tb>(memberships: &Tb, group_id: u64) -> StoreResult<Vec<u64>>
where
    Tb: ReadableTable<(u64, u64), &'static [u8]>,
{
    let mut ids = Vec::new();
    for entry in memberships.range((group_id, 0)..=(group_id, u64::MAX))? {
        let (key, _) = entry?;
        ids.push(key.value().1);
    }
    Ok(ids)
}

/// Insert a membership unless it exists. Callers check the foreign keys.
pub(crate) fn insert_membership(
    memberships: &mut Table<'_, (u64, u64), &'static [u8]>,
    group_id: u64,
    user_id: u64,
) -> StoreResult<Option<GroupMembership>> {
    if memberships.get((group_id, user_id))?.is_some() {
        return Ok(None);
    }
    let membership = GroupMembership {
        group_id,
        user_id,
        joined_at: Utc::now(),
    };
    memberships.insert((group_id, user_id), encode(&membership)?.as_slice())?;
    Ok(Some(membership))
}

/// `NotFound` unless both the group and the user exist.
pub(crate) fn check_group_and_user(
    txn: &WriteTransaction,
    group_id: u64,
    user_id: u64,
) -> StoreResult<()> {
    let groups = txn.open_table(GROUPS)?;
    let _: super::groups::Group = require_row(&groups, group_id, "Group")?;
    let users = txn.open_table(USERS)?;
    let _: User = require_row(&users, user_id, "User")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::repository::{CreateGroup, CreateUser, GroupRepository, UserRepository};
    use crate::storage::StoreError;

    fn setup(db: &Database) -> (u64, u64, u64) {
        let users = UserRepository::new(db);
        let owner = users
            .create(&CreateUser {
                name: "owner".into(),
                password: "pw".into(),
                organizator: true,
                administrator: false,
            })
            .unwrap();
        let member = users
            .create(&CreateUser {
                name: "member".into(),
                password: "pw".into(),
                organizator: false,
                administrator: false,
            })
            .unwrap();
        let group = GroupRepository::new(db)
            .create(&CreateGroup {
                name: "team".into(),
                owner_id: owner.id,
            })
            .unwrap();
        (owner.id, member.id, group.id)
    }

    #[test]
    fn add_member_is_idempotent() {
        let (db, _dir) = temp_db();
        let (_, member, group) = setup(&db);
        let repo = MembershipRepository::new(&db);

        let first = repo.add_member(member, group).unwrap();
        assert!(first.is_some());
        assert!(repo.add_member(member, group).unwrap().is_none());
        assert!(repo.is_member(member, group).unwrap());
        assert_eq!(repo.members_of(group).unwrap().len(), 1);
    }

    #[test]
    fn add_member_requires_existing_rows() {
        let (db, _dir) = temp_db();
        let (_, member, group) = setup(&db);
        let repo = MembershipRepository::new(&db);

        assert!(matches!(repo.add_member(99, group), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.add_member(member, 99), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_member_returns_removed_row() {
        let (db, _dir) = temp_db();
        let (_, member, group) = setup(&db);
        let repo = MembershipRepository::new(&db);
        repo.add_member(member, group).unwrap();

        let removed = repo.remove_member(member, group).unwrap().unwrap();
        assert_eq!(removed.user_id, member);
        assert!(repo.remove_member(member, group).unwrap().is_none());
        assert!(!repo.is_member(member, group).unwrap());
    }

    #[test]
    fn members_of_lists_summaries_in_id_order() {
        let (db, _dir) = temp_db();
        let (owner, member, group) = setup(&db);
        let repo = MembershipRepository::new(&db);
        repo.add_member(member, group).unwrap();
        repo.add_member(owner, group).unwrap();

        let members = repo.members_of(group).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].id, owner);
        assert!(members[0].organizator);
        assert_eq!(members[1].name, "member");

        assert!(repo.members_of(group + 1).unwrap().is_empty());
    }
}
