// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Poll option repository.

use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::polls::Poll;
use crate::storage::database::{
    encode, next_id, require_row, scan_rows, Database, POLLS, POLL_OPTIONS,
};
use crate::storage::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PollOption {
    pub id: u64,
    pub poll_id: u64,
    pub content: String,
    /// Display position, ascending
    pub option_order: i32,
}

#[derive(Debug, Clone)]
pub struct CreateOption {
    pub poll_id: u64,
    pub content: String,
    pub option_order: i32,
}

#[derive(Debug, Clone)]
pub struct UpdateOption {
    pub content: String,
    pub option_order: i32,
}

/// One entry of a bulk insert. A missing order defaults to the entry's index.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewOption {
    pub content: String,
    #[serde(default)]
    pub option_order: Option<i32>,
}

pub struct PollOptionRepository<'a> {
    db: &'a Database,
}

impl<'a> PollOptionRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, input: &CreateOption) -> StoreResult<PollOption> {
        let mut created = self.create_bulk(
            input.poll_id,
            &[NewOption {
                content: input.content.clone(),
                option_order: Some(input.option_order),
            }],
        )?;
        created
            .pop()
            .ok_or_else(|| StoreError::Validation("No option created".into()))
    }

    pub fn get(&self, option_id: u64) -> StoreResult<PollOption> {
        let read_txn = self.db.begin_read()?;
        let options = read_txn.open_table(POLL_OPTIONS)?;
        require_row(&options, option_id, "Poll option")
    }

    pub fn update(&self, option_id: u64, input: &UpdateOption) -> StoreResult<PollOption> {
        let content = validate_content(&input.content)?;

        self.db.transaction(|txn| {
            let mut options = txn.open_table(POLL_OPTIONS)?;
            let mut option: PollOption = require_row(&options, option_id, "Poll option")?;
            option.content = content.to_string();
            option.option_order = input.option_order;
            options.insert(option_id, encode(&option)?.as_slice())?;
            Ok(option)
        })
    }

    pub fn delete(&self, option_id: u64) -> StoreResult<()> {
        self.db.transaction(|txn| {
            let mut options = txn.open_table(POLL_OPTIONS)?;
            let _: PollOption = require_row(&options, option_id, "Poll option")?;
            options.remove(option_id)?;
            Ok(())
        })
    }

    /// Options of a poll in display order.
    pub fn by_poll(&self, poll_id: u64) -> StoreResult<Vec<PollOption>> {
        let read_txn = self.db.begin_read()?;
        let options = read_txn.open_table(POLL_OPTIONS)?;
        options_of(&options, poll_id)
    }

    /// Insert several options for one poll. All or none are stored.
    pub fn create_bulk(&self, poll_id: u64, options: &[NewOption]) -> StoreResult<Vec<PollOption>> {
        self.db.transaction(|txn| {
            let polls = txn.open_table(POLLS)?;
            let _: Poll = require_row(&polls, poll_id, "Poll")?;
            drop(polls);
            insert_options(txn, poll_id, options)
        })
    }
}

/// Options of `poll_id`, ordered by `option_order` then id.
pub(crate) fn options_of<Tb>(options: &Tb, poll_id: u64) -> StoreResult<Vec<PollOption>>
where
    Tb: ReadableTable<u64, &'static [u8]>,
{
    let mut rows: Vec<PollOption> = scan_rows(options)?;
    rows.retain(|o| o.poll_id == poll_id);
    rows.sort_by_key(|o| (o.option_order, o.id));
    Ok(rows)
}

/// Insert options for a poll the caller has already checked.
pub(crate) fn insert_options(
    txn: &WriteTransaction,
    poll_id: u64,
    options: &[NewOption],
) -> StoreResult<Vec<PollOption>> {
    let mut table = txn.open_table(POLL_OPTIONS)?;
    let mut created = Vec::with_capacity(options.len());
    for (index, option) in options.iter().enumerate() {
        let content = validate_content(&option.content)?;
        let default_order = i32::try_from(index)
            .map_err(|_| StoreError::Validation("Too many options".into()))?;
        let row = PollOption {
            id: next_id(txn, "poll_options")?,
            poll_id,
            content: content.to_string(),
            option_order: option.option_order.unwrap_or(default_order),
        };
        table.insert(row.id, encode(&row)?.as_slice())?;
        created.push(row);
    }
    Ok(created)
}

fn validate_content(content: &str) -> StoreResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(StoreError::Validation(
            "Option content must not be empty".into(),
        ));
    }
    Ok(content)
}
