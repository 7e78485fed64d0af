use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use crate::{error::StoreError, models::LinkRecord};

/// Thread-safe in-memory store mapping short_id -> LinkRecord.
///
/// Backed by a DashMap: every operation on one key runs under that key's
/// shard lock, so read-modify-write on a single record is atomic with
/// respect to concurrent callers. No operation performs I/O while holding a
/// lock. Callers must not hold a reference into the map across calls; all
/// reads hand back owned clones.
#[derive(Clone, Debug, Default)]
pub struct LinkStore {
    inner: Arc<DashMap<String, LinkRecord>>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under `token`.
    ///
    /// Fails with `Conflict` if the token already holds a record that is
    /// still live at `now`. An expired occupant is replaced.
    pub fn insert(
        &self,
        token: &str,
        record: LinkRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.inner.entry(token.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired_at(now) {
                    return Err(StoreError::Conflict);
                }
                tracing::debug!(short_id = %token, "replacing expired record");
                occupied.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }
        Ok(())
    }

    /// Snapshot of the record stored under `token`.
    pub fn get(&self, token: &str) -> Result<LinkRecord, StoreError> {
        self.inner
            .get(token)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    /// Remove a record. Returns `true` if something was removed; removing an
    /// absent token is not an error.
    #[cfg(test)]
    pub fn remove(&self, token: &str) -> bool {
        self.inner.remove(token).is_some()
    }

    /// Remove the record only if `pred` holds for it, checked under the same
    /// lock as the removal.
    pub fn remove_if<F>(&self, token: &str, pred: F) -> Option<LinkRecord>
    where
        F: FnOnce(&LinkRecord) -> bool,
    {
        self.inner
            .remove_if(token, |_, record| pred(record))
            .map(|(_, record)| record)
    }

    /// Run `f` against the record under `token` while holding its lock.
    pub fn mutate<F, T>(&self, token: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut LinkRecord) -> T,
    {
        let mut record = self.inner.get_mut(token).ok_or(StoreError::NotFound)?;
        Ok(f(record.value_mut()))
    }

    /// Number of records currently stored, expired-but-unpurged included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
