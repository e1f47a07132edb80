//! Accumulating changes to a versioned map.

use std::collections::BTreeMap;

use super::hash::Hash;
use super::locks::ResourceGuard;
use super::node::{MapOp, ResourceKind, VersionNode};
use super::store::VersionStore;
use crate::error::{Error, Result};
use crate::kv::check_key;
use crate::logging::{debug, trace};

/// A version computed by [`MapBatch::sync`] and not yet written.
struct Synced {
    token: Hash,
    predecessor: Option<Hash>,
    node: VersionNode,
    bytes: Vec<u8>,
}

/// Changes to one map, published as a single new version.
///
/// A batch moves through three steps: accumulate with [`put`](Self::put)
/// and [`delete`](Self::delete), compute the next version with
/// [`sync`](Self::sync), then publish it with [`write`](Self::write).
/// Nothing is visible to readers before `write` succeeds.
///
/// Only one batch per map is open at a time. A successful `write` closes
/// the batch and lets the next one start; so does dropping it.
pub struct MapBatch<'a> {
    store: &'a VersionStore,
    name: String,
    pending: BTreeMap<Vec<u8>, MapOp>,
    synced: Option<Synced>,
    written: bool,
    /// Held until the batch is written or dropped.
    guard: Option<ResourceGuard<'a>>,
}

impl<'a> MapBatch<'a> {
    pub(crate) fn new(store: &'a VersionStore, name: &str, guard: ResourceGuard<'a>) -> Self {
        Self {
            store,
            name: name.to_string(),
            pending: BTreeMap::new(),
            synced: None,
            written: false,
            guard: Some(guard),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct keys touched so far.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Stage `key = value` and return the token of this single write.
    ///
    /// A later put or delete of the same key in this batch replaces it.
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<Hash> {
        let (key, value) = (key.as_ref(), value.as_ref());
        self.check_open()?;
        check_key(key, self.store.max_key_size())?;
        self.invalidate_sync();
        self.pending
            .insert(key.to_vec(), MapOp::Put(value.to_vec()));
        Ok(Hash::of_entry(key, value))
    }

    /// Stage removal of `key`.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        self.check_open()?;
        check_key(key, self.store.max_key_size())?;
        self.invalidate_sync();
        self.pending.insert(key.to_vec(), MapOp::Delete);
        Ok(())
    }

    /// Compute the version token the batch will publish. Nothing is persisted.
    ///
    /// The token covers the map's current head, so it names this exact
    /// history. Syncing again without changes returns the same token.
    pub fn sync(&mut self) -> Result<Hash> {
        self.check_open()?;
        if let Some(synced) = &self.synced {
            return Ok(synced.token);
        }

        let predecessor = self
            .store
            .head(ResourceKind::Map, self.name.as_bytes())?
            .token();
        let node = VersionNode::map(self.name.as_bytes(), predecessor, self.pending.clone());
        let (bytes, token) = node.encode()?;

        trace!(
            map = %self.name,
            ops = self.pending.len(),
            version = %token,
            "map batch synced"
        );
        self.synced = Some(Synced {
            token,
            predecessor,
            node,
            bytes,
        });
        Ok(token)
    }

    /// Publish the synced version, making it the map's head.
    ///
    /// Fails with an invalid-argument error if the batch was not synced
    /// since its last change, or was already written.
    pub fn write(&mut self) -> Result<Hash> {
        self.check_open()?;
        let Some(synced) = &self.synced else {
            return Err(Error::invalid(format!(
                "batch on map '{}' must be synced before write",
                self.name
            )));
        };

        let head = self
            .store
            .head(ResourceKind::Map, self.name.as_bytes())?
            .token();
        if head != synced.predecessor {
            return Err(Error::invalid(format!(
                "head of map '{}' moved since sync",
                self.name
            )));
        }

        self.store
            .commit_map(&self.name, &synced.node, &synced.bytes, &synced.token)?;
        let token = synced.token;
        self.written = true;
        self.guard = None;
        debug!(map = %self.name, version = %token, "map batch written");
        Ok(token)
    }

    fn check_open(&self) -> Result<()> {
        if self.written {
            return Err(Error::invalid(format!(
                "batch on map '{}' was already written",
                self.name
            )));
        }
        Ok(())
    }

    fn invalidate_sync(&mut self) {
        if self.synced.take().is_some() {
            trace!(map = %self.name, "sync invalidated by new change");
        }
    }
}
