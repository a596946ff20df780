// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! In-memory draft store.
//!
//! The hosting layer owns a [`DraftStore`] and shares it between request
//! handlers.  Each draft sits behind its own mutex: edits and merges of
//! one draft are serialized, while different drafts proceed in parallel.
//! The outer map lock is only held long enough to find a draft.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::change::ChangeOperation;
use crate::common::{Error, ErrorCode};
use crate::datamodel::Model;
use crate::draft::{Draft, DraftId, DraftSummary};
use crate::merge::{MergeOptions, MergeResult, merge};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("draft {0} does not exist")]
    NotFound(DraftId),
    #[error("{0}")]
    Rejected(#[from] Error),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound(_) => ErrorCode::DoesNotExist,
            StoreError::Rejected(err) => err.code,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
pub struct DraftStore {
    drafts: RwLock<BTreeMap<DraftId, Arc<Mutex<Draft>>>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn draft(&self, id: DraftId) -> StoreResult<Arc<Mutex<Draft>>> {
        self.drafts
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// lock a draft found by `draft`.  A commit or discard may have
    /// removed it from the store while we waited for the lock, in which
    /// case it no longer exists.
    fn lock<'a>(
        &self,
        id: DraftId,
        entry: &'a Arc<Mutex<Draft>>,
    ) -> StoreResult<MutexGuard<'a, Draft>> {
        let draft = entry.lock();
        let current = self
            .drafts
            .read()
            .get(&id)
            .is_some_and(|d| Arc::ptr_eq(d, entry));
        if !current {
            return Err(StoreError::NotFound(id));
        }
        Ok(draft)
    }

    pub fn create_draft(&self, based_on: Option<&str>) -> DraftId {
        self.insert(Draft::new(based_on))
    }

    /// insert adopts an existing draft, for example one read back from
    /// storage, replacing any draft with the same id.
    pub fn insert(&self, draft: Draft) -> DraftId {
        let id = draft.id;
        debug!(draft = %id, based_on = ?draft.based_on, "storing draft");
        self.drafts.write().insert(id, Arc::new(Mutex::new(draft)));
        id
    }

    pub fn append_change(&self, id: DraftId, op: ChangeOperation) -> StoreResult<usize> {
        let entry = self.draft(id)?;
        let mut draft = self.lock(id, &entry)?;
        let kind = op.kind();
        let index = draft.add_change(op)?;
        debug!(draft = %id, index, op = %kind, "appended change");
        Ok(index)
    }

    pub fn remove_change(&self, id: DraftId, index: usize) -> StoreResult<ChangeOperation> {
        let entry = self.draft(id)?;
        let op = self.lock(id, &entry)?.remove_change(index)?;
        debug!(draft = %id, index, op = %op.kind(), "removed change");
        Ok(op)
    }

    /// a snapshot of the draft
    pub fn get(&self, id: DraftId) -> StoreResult<Draft> {
        let entry = self.draft(id)?;
        let draft = self.lock(id, &entry)?.clone();
        Ok(draft)
    }

    /// summaries of every draft, newest first
    pub fn list(&self) -> Vec<DraftSummary> {
        let drafts: Vec<_> = self.drafts.read().values().cloned().collect();
        let mut summaries: Vec<_> = drafts.iter().map(|d| d.lock().summary()).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub fn update_description(&self, id: DraftId, description: Option<String>) -> StoreResult<()> {
        let entry = self.draft(id)?;
        self.lock(id, &entry)?.description = description;
        Ok(())
    }

    pub fn set_metadata(&self, id: DraftId, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let entry = self.draft(id)?;
        self.lock(id, &entry)?.metadata.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn discard(&self, id: DraftId) -> StoreResult<Draft> {
        let draft = self
            .drafts
            .write()
            .remove(&id)
            .ok_or(StoreError::NotFound(id))?;
        debug!(draft = %id, "discarded draft");
        let draft = draft.lock().clone();
        Ok(draft)
    }

    /// merge the draft against `base`.  The draft stays locked for the
    /// duration, so concurrent edits to it wait for the merge.
    pub fn merge(&self, id: DraftId, base: &Model, options: &MergeOptions) -> StoreResult<MergeResult> {
        let entry = self.draft(id)?;
        let draft = self.lock(id, &entry)?;
        Ok(merge(base, &draft, options))
    }

    /// commit merges in commit mode and, when the result should be
    /// committed, removes the draft from the store.  Persisting the
    /// effective model is up to the caller.
    pub fn commit(&self, id: DraftId, base: &Model) -> StoreResult<MergeResult> {
        let entry = self.draft(id)?;
        let draft = self.lock(id, &entry)?;
        let result = merge(base, &draft, &MergeOptions::commit());
        if result.should_commit() {
            self.drafts.write().remove(&id);
            debug!(draft = %id, "committed draft");
        } else {
            debug!(draft = %id, skipped = result.skipped.len(), "draft not committed");
        }
        Ok(result)
    }

    /// merge several drafts against the same base in parallel
    pub fn merge_many(
        &self,
        ids: &[DraftId],
        base: &Model,
        options: &MergeOptions,
    ) -> Vec<(DraftId, StoreResult<MergeResult>)> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            use rayon::prelude::*;

            ids.par_iter()
                .map(|&id| (id, self.merge(id, base, options)))
                .collect()
        }
        #[cfg(target_arch = "wasm32")]
        {
            ids.iter()
                .map(|&id| (id, self.merge(id, base, options)))
                .collect()
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.read().is_empty()
    }
}
