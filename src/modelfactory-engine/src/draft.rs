// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::change::ChangeOperation;
use crate::common::Result;
use crate::draft_err;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn new() -> Self {
        DraftId(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DraftId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(DraftId(Uuid::parse_str(s)?))
    }
}

/// An ordered list of proposed changes against one base model version.
/// The base itself is never touched; merging the draft produces a new
/// effective model.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// the version of the base model this draft was forked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeOperation>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Draft {
    pub fn new(based_on: Option<&str>) -> Self {
        Draft {
            id: DraftId::new(),
            created_at: OffsetDateTime::now_utc(),
            based_on: based_on.map(|v| v.to_owned()),
            description: None,
            changes: vec![],
            metadata: BTreeMap::new(),
        }
    }

    /// append a change after checking its payload, returning its index
    pub fn add_change(&mut self, op: ChangeOperation) -> Result<usize> {
        op.check()?;
        self.changes.push(op);
        Ok(self.changes.len() - 1)
    }

    pub fn remove_change(&mut self, index: usize) -> Result<ChangeOperation> {
        if index >= self.changes.len() {
            return draft_err!(
                ChangeIndexOutOfRange,
                format!(
                    "index {index} but draft {} has {} changes",
                    self.id,
                    self.changes.len()
                )
            );
        }
        Ok(self.changes.remove(index))
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            id: self.id,
            created_at: self.created_at,
            based_on: self.based_on.clone(),
            description: self.description.clone(),
            change_count: self.changes.len(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DraftSummary {
    pub id: DraftId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub change_count: usize,
}
