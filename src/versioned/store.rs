//! Versioned maps and blobs on top of fjall keyspaces.

use std::collections::{BTreeMap, HashSet};

use fjall::{Database, Keyspace, KeyspaceCreateOptions};

use super::batch::MapBatch;
use super::hash::Hash;
use super::locks::ResourceLocks;
use super::node::{MapOp, NodeBody, ResourceKind, VersionNode};
use crate::config::{Durability, Options};
use crate::error::{Error, Result};
use crate::kv::{RecordIterator, check_key};
use crate::logging::{debug, info, trace, warn};

/// Version nodes by token.
const VERSIONS_KEYSPACE: &str = "_versions";
/// Head token per resource.
const HEADS_KEYSPACE: &str = "_heads";
/// Entries of every map at its head version.
const CURRENT_KEYSPACE: &str = "_map_current";

/// Longest accepted map name, in bytes.
pub const MAX_MAP_NAME_LEN: usize = 252;

/// Where a resource's chain currently ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Head {
    Uninitialized,
    /// Initialized, no version committed yet.
    Empty,
    At(Hash),
}

impl Head {
    pub fn token(self) -> Option<Hash> {
        match self {
            Head::At(token) => Some(token),
            Head::Uninitialized | Head::Empty => None,
        }
    }
}

/// Content-addressed, append-only versioned maps and blobs.
///
/// Every committed map batch or blob put becomes an immutable node keyed by
/// its SHA-256 token. Each node links to its predecessor, so any earlier
/// version stays readable after later versions overwrite a key.
///
/// # Example
///
/// ```ignore
/// let versions = db.versions();
/// versions.init_map("m")?;
///
/// let mut batch = versions.start_map_batch("m")?;
/// batch.put("k1", "v1")?;
/// let v1 = batch.sync()?;
/// batch.write()?;
/// drop(batch);
///
/// assert_eq!(versions.get_map_at("m", "k1", &v1)?, Some(b"v1".to_vec()));
/// assert_eq!(versions.previous_version("m", &v1)?, None);
/// ```
pub struct VersionStore {
    db: Database,
    versions: Keyspace,
    heads: Keyspace,
    current: Keyspace,
    locks: ResourceLocks,
    durability: Durability,
    max_key_size: usize,
}

impl VersionStore {
    pub(crate) fn open(db: &Database, options: &Options) -> Result<Self> {
        let versions = db.keyspace(VERSIONS_KEYSPACE, KeyspaceCreateOptions::default)?;
        let heads = db.keyspace(HEADS_KEYSPACE, KeyspaceCreateOptions::default)?;
        let current = db.keyspace(CURRENT_KEYSPACE, KeyspaceCreateOptions::default)?;
        Ok(Self {
            db: db.clone(),
            versions,
            heads,
            current,
            locks: ResourceLocks::default(),
            durability: options.durability,
            max_key_size: options.max_key_size.min(Options::MAX_KEY_SIZE),
        })
    }

    // Maps

    /// Register an empty map. Re-initializing an existing map is a no-op.
    pub fn init_map(&self, name: &str) -> Result<()> {
        check_map_name(name)?;
        if self.head(ResourceKind::Map, name.as_bytes())? != Head::Uninitialized {
            trace!(map = name, "map already initialized");
            return Ok(());
        }
        let _guard = self.locks.acquire(ResourceKind::Map.head_key(name.as_bytes()));
        self.ensure_map(name)
    }

    /// Begin accumulating a batch against `name`, waiting while another
    /// batch on the same map is in flight.
    ///
    /// A map that was never initialized is initialized first.
    pub fn start_map_batch(&self, name: &str) -> Result<MapBatch<'_>> {
        check_map_name(name)?;
        let guard = self.locks.acquire(ResourceKind::Map.head_key(name.as_bytes()));
        self.ensure_map(name)?;
        trace!(map = name, "map batch started");
        Ok(MapBatch::new(self, name, guard))
    }

    /// Like [`start_map_batch`](Self::start_map_batch), but fails with an
    /// invalid-argument error instead of waiting.
    pub fn try_start_map_batch(&self, name: &str) -> Result<MapBatch<'_>> {
        check_map_name(name)?;
        let Some(guard) = self
            .locks
            .try_acquire(ResourceKind::Map.head_key(name.as_bytes()))
        else {
            warn!(map = name, "map batch already in progress");
            return Err(Error::invalid(format!(
                "a batch on map '{}' is already in progress",
                name
            )));
        };
        self.ensure_map(name)?;
        Ok(MapBatch::new(self, name, guard))
    }

    /// Head version of a map, `None` before its first committed batch.
    pub fn map_head(&self, name: &str) -> Result<Option<Hash>> {
        self.require_initialized(ResourceKind::Map, name.as_bytes())
            .map(Head::token)
    }

    /// Value of `key` at the map's head version.
    pub fn get_map(&self, name: &str, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        self.require_initialized(ResourceKind::Map, name.as_bytes())?;
        if key.len() > self.max_key_size {
            return Ok(None);
        }
        let value = self.current.get(current_key(name, key))?;
        Ok(value.map(|v| v.to_vec()))
    }

    /// Value of `key` as of `version`.
    ///
    /// `None` if the key did not exist then, or if `version` is not a
    /// version of this map.
    pub fn get_map_at(
        &self,
        name: &str,
        key: impl AsRef<[u8]>,
        version: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        self.require_initialized(ResourceKind::Map, name.as_bytes())?;

        let Some(start) = self.load_node(version)? else {
            return Ok(None);
        };
        if !start.belongs_to(ResourceKind::Map, name.as_bytes()) {
            debug!(map = name, version = %version, "version belongs to another resource");
            return Ok(None);
        }

        let mut seen = HashSet::new();
        let mut node = start;
        let mut token = *version;
        loop {
            match node.map_op(key) {
                Some(MapOp::Put(value)) => return Ok(Some(value.clone())),
                Some(MapOp::Delete) => return Ok(None),
                None => {}
            }
            seen.insert(token);
            let Some(pred) = node.predecessor else {
                return Ok(None);
            };
            if seen.contains(&pred) {
                return Err(Error::corruption(format!("version chain cycle at {}", pred)));
            }
            node = self.require_node(&pred)?;
            token = pred;
        }
    }

    /// Iterator over the whole map as of `version`, or as of the current head.
    ///
    /// The snapshot is fixed when the iterator is created.
    pub fn map_iter(&self, name: &str, version: Option<&Hash>) -> Result<RecordIterator> {
        let head = self.require_initialized(ResourceKind::Map, name.as_bytes())?;
        let Some(target) = version.copied().or(head.token()) else {
            return Ok(RecordIterator::empty());
        };

        let chain = self.chain_nodes(ResourceKind::Map, name.as_bytes(), target)?;
        if chain.is_empty() {
            return Ok(RecordIterator::empty());
        }

        let mut state = BTreeMap::new();
        for node in chain.into_iter().rev() {
            if let NodeBody::Map(ops) = node.body {
                for (key, op) in ops {
                    match op {
                        MapOp::Put(value) => {
                            state.insert(key, value);
                        }
                        MapOp::Delete => {
                            state.remove(&key);
                        }
                    }
                }
            }
        }
        Ok(RecordIterator::from_sorted(state.into_iter().collect()))
    }

    // Blobs

    /// Store a new version of the blob at `key` and return its token.
    pub fn put_blob(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<Hash> {
        let key = key.as_ref();
        check_key(key, self.max_key_size)?;
        let head_key = ResourceKind::Blob.head_key(key);
        let _guard = self.locks.acquire(head_key.clone());

        let predecessor = self.head(ResourceKind::Blob, key)?.token();
        let node = VersionNode::blob(key, predecessor, value.as_ref().to_vec());
        let (bytes, token) = node.encode()?;

        let mut batch = self.db.batch();
        batch.insert(&self.versions, token.as_bytes().as_slice(), bytes.as_slice());
        batch.insert(&self.heads, head_key.as_slice(), token.as_bytes().as_slice());
        batch.commit()?;
        self.db.persist(self.durability.persist_mode())?;

        debug!(
            blob_key_len = key.len(),
            value_len = value.as_ref().len(),
            version = %token,
            "blob version committed"
        );
        Ok(token)
    }

    /// Latest value of the blob at `key`.
    pub fn get_blob(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        let Some(token) = self.head(ResourceKind::Blob, key)?.token() else {
            return Ok(None);
        };
        let node = self.require_node(&token)?;
        Ok(blob_value(node))
    }

    /// Value of the blob at `key` as of `version`.
    pub fn get_blob_at(&self, key: impl AsRef<[u8]>, version: &Hash) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        match self.load_node(version)? {
            Some(node) if node.belongs_to(ResourceKind::Blob, key) => Ok(blob_value(node)),
            _ => Ok(None),
        }
    }

    // Chains

    /// Predecessor of `version` in the chain of the map or blob named `resource`.
    ///
    /// `None` when `version` is the origin of the chain, is unknown, or
    /// belongs to a different resource.
    pub fn previous_version(
        &self,
        resource: impl AsRef<[u8]>,
        version: &Hash,
    ) -> Result<Option<Hash>> {
        match self.load_node(version)? {
            Some(node) if node.resource == resource.as_ref() => Ok(node.predecessor),
            _ => Ok(None),
        }
    }

    /// Version tokens of a resource, newest first.
    pub fn history(&self, kind: ResourceKind, resource: impl AsRef<[u8]>) -> Result<Vec<Hash>> {
        let resource = resource.as_ref();
        let Some(head) = self.head(kind, resource)?.token() else {
            return Ok(Vec::new());
        };
        let mut tokens = Vec::new();
        self.walk(head, |token, _| tokens.push(token))?;
        Ok(tokens)
    }

    /// Re-hash every node of a resource's chain and check each one matches
    /// the token it is stored under. Returns the chain length.
    pub fn verify_history(&self, kind: ResourceKind, resource: impl AsRef<[u8]>) -> Result<usize> {
        let resource = resource.as_ref();
        let Some(mut next) = self.head(kind, resource)?.token() else {
            return Ok(0);
        };
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(next) {
                return Err(Error::corruption(format!("version chain cycle at {}", next)));
            }
            let bytes = self
                .versions
                .get(next.as_bytes())?
                .ok_or_else(|| Error::corruption(format!("missing version node {}", next)))?;
            let actual = VersionNode::token_of(&bytes)?;
            if actual != next {
                warn!(expected = %next, actual = %actual, "version token mismatch");
                return Err(Error::corruption(format!(
                    "version node {} hashes to {}",
                    next, actual
                )));
            }
            let node = VersionNode::decode(&bytes)?;
            if !node.belongs_to(kind, resource) {
                return Err(Error::corruption(format!(
                    "version node {} belongs to another resource",
                    next
                )));
            }
            match node.predecessor {
                Some(pred) => next = pred,
                None => return Ok(seen.len()),
            }
        }
    }

    // Internals shared with MapBatch

    /// Resources named longer than the key limit can never have been written.
    pub(crate) fn head(&self, kind: ResourceKind, resource: &[u8]) -> Result<Head> {
        if resource.len() > self.max_key_size {
            return Ok(Head::Uninitialized);
        }
        let Some(raw) = self.heads.get(kind.head_key(resource))? else {
            return Ok(Head::Uninitialized);
        };
        if raw.is_empty() {
            return Ok(Head::Empty);
        }
        Hash::from_slice(&raw)
            .map(Head::At)
            .map_err(|_| Error::corruption(format!("bad head pointer of {} bytes", raw.len())))
    }

    pub(crate) fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    /// Atomically store a map node, advance the head and update the
    /// head-version entries.
    pub(crate) fn commit_map(
        &self,
        name: &str,
        node: &VersionNode,
        bytes: &[u8],
        token: &Hash,
    ) -> Result<()> {
        let mut batch = self.db.batch();
        batch.insert(&self.versions, token.as_bytes().as_slice(), bytes);
        batch.insert(
            &self.heads,
            ResourceKind::Map.head_key(name.as_bytes()).as_slice(),
            token.as_bytes().as_slice(),
        );
        if let NodeBody::Map(ops) = &node.body {
            for (key, op) in ops {
                let entry_key = current_key(name, key);
                match op {
                    MapOp::Put(value) => {
                        batch.insert(&self.current, entry_key.as_slice(), value.as_slice())
                    }
                    MapOp::Delete => batch.remove(&self.current, entry_key.as_slice()),
                }
            }
        }
        batch.commit()?;
        self.db.persist(self.durability.persist_mode())?;

        info!(map = name, version = %token, "map version committed");
        Ok(())
    }

    fn ensure_map(&self, name: &str) -> Result<()> {
        if self.head(ResourceKind::Map, name.as_bytes())? != Head::Uninitialized {
            trace!(map = name, "map already initialized");
            return Ok(());
        }
        self.heads
            .insert(ResourceKind::Map.head_key(name.as_bytes()).as_slice(), b"".as_slice())?;
        self.db.persist(self.durability.persist_mode())?;
        info!(map = name, "map initialized");
        Ok(())
    }

    fn require_initialized(&self, kind: ResourceKind, resource: &[u8]) -> Result<Head> {
        match self.head(kind, resource)? {
            Head::Uninitialized => Err(Error::invalid(format!(
                "map '{}' is not initialized",
                String::from_utf8_lossy(resource)
            ))),
            head => Ok(head),
        }
    }

    fn load_node(&self, token: &Hash) -> Result<Option<VersionNode>> {
        let Some(bytes) = self.versions.get(token.as_bytes())? else {
            return Ok(None);
        };
        VersionNode::decode(&bytes).map(Some)
    }

    /// A node that a chain link promises exists.
    fn require_node(&self, token: &Hash) -> Result<VersionNode> {
        self.load_node(token)?
            .ok_or_else(|| Error::corruption(format!("missing version node {}", token)))
    }

    fn walk(&self, from: Hash, mut visit: impl FnMut(Hash, VersionNode)) -> Result<()> {
        let mut seen = HashSet::new();
        let mut next = Some(from);
        while let Some(token) = next {
            if !seen.insert(token) {
                return Err(Error::corruption(format!("version chain cycle at {}", token)));
            }
            let node = self.require_node(&token)?;
            next = node.predecessor;
            visit(token, node);
        }
        Ok(())
    }

    /// Nodes from `version` back to the origin, newest first. Empty when
    /// `version` is not part of the resource's chain.
    fn chain_nodes(
        &self,
        kind: ResourceKind,
        resource: &[u8],
        version: Hash,
    ) -> Result<Vec<VersionNode>> {
        match self.load_node(&version)? {
            Some(node) if node.belongs_to(kind, resource) => {}
            _ => return Ok(Vec::new()),
        }
        let mut nodes = Vec::new();
        self.walk(version, |_, node| nodes.push(node))?;
        Ok(nodes)
    }
}

fn blob_value(node: VersionNode) -> Option<Vec<u8>> {
    match node.body {
        NodeBody::Blob(value) => Some(value),
        NodeBody::Map(_) => None,
    }
}

fn check_map_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid("map name must not be empty"));
    }
    if name.len() > MAX_MAP_NAME_LEN {
        return Err(Error::invalid(format!(
            "map name is {} bytes, limit is {}",
            name.len(),
            MAX_MAP_NAME_LEN
        )));
    }
    Ok(())
}

/// Key of a map entry in the head-version keyspace: name length, name, key.
fn current_key(name: &str, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + name.len() + key.len());
    out.extend_from_slice(&(name.len() as u32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_keys_do_not_collide_across_maps() {
        // "ab" + "c" and "a" + "bc" must stay distinct.
        assert_ne!(current_key("ab", b"c"), current_key("a", b"bc"));
        assert!(current_key("m", b"k").starts_with(&[0, 0, 0, 1, b'm']));
    }

    #[test]
    fn test_map_name_limits() {
        assert!(check_map_name("").unwrap_err().is_invalid_argument());
        assert!(check_map_name(&"x".repeat(MAX_MAP_NAME_LEN)).is_ok());
        assert!(check_map_name(&"x".repeat(MAX_MAP_NAME_LEN + 1)).is_err());
    }
}
