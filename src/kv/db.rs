//! Record store with column families, backed by fjall.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fjall::{Database, Keyspace, KeyspaceCreateOptions, PersistMode};

use super::batch::{BatchOp, WriteBatch};
use super::family::{ColumnFamily, DEFAULT_FAMILY, Registry};
use super::iter::RecordIterator;
use super::check_key;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::logging::{debug, error, info, trace, warn};
use crate::versioned::{Hash, MapBatch, VersionStore};

/// Key prefixes and keys of the metadata keyspace.
const META_KEYSPACE: &str = "_meta";
const META_CONFIG_KEY: &str = "config";
const META_NEXT_ID_KEY: &str = "next-family-id";
const META_FAMILIES_PREFIX: &str = "families/";

/// Current store version (1).
/// Increment this when changing the on-disk layout or metadata format.
/// The store will reject opening databases with a different version.
const STORE_VERSION: u32 = 1;

const DEFAULT_FAMILY_ID: u32 = 0;

/// A persistent, ordered key-value store with column families and
/// versioned maps and blobs.
///
/// Every column family is its own fjall keyspace. Keys within a family are
/// ordered byte-lexicographically. Point operations without a family
/// argument use the `default` family, which always exists.
///
/// # Example
///
/// ```ignore
/// use chainkv::{Db, WriteBatch};
///
/// let db = Db::open("/tmp/chainkv")?;
/// db.put("key1", "val1")?;
/// assert_eq!(db.get("key1")?, Some(b"val1".to_vec()));
///
/// let mut batch = WriteBatch::new();
/// batch.put("a", "1");
/// batch.delete("key1");
/// db.write(&batch)?;
///
/// let users = db.create_column_family("users")?;
/// db.put_cf(&users, "alice", "admin")?;
/// ```
///
/// # Persistence
///
/// Writes return once they are persisted according to
/// [`Options::durability`]. With the default [`Durability::Sync`](crate::Durability::Sync)
/// a write that returned `Ok` survives a crash.
pub struct Db {
    db: Database,
    meta: Keyspace,
    families: RwLock<Registry>,
    versions: VersionStore,
    options: Options,
}

impl Db {
    /// Open the store at `path` with default options, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(Options::new(path))
    }

    /// Open a store with explicit options.
    ///
    /// `max_key_size` is clamped to [`Options::MAX_KEY_SIZE`].
    pub fn open_with(mut options: Options) -> Result<Self> {
        options.max_key_size = options.max_key_size.min(Options::MAX_KEY_SIZE);
        let path = options.path.clone();
        debug!(path = %path.display(), create = options.create_if_missing, "opening store");

        if !path.exists() && !options.create_if_missing {
            error!(path = %path.display(), "store path does not exist");
            return Err(Error::NotInitialized(path.display().to_string()));
        }

        let db = Database::builder(&path).open()?;
        let meta = db.keyspace(META_KEYSPACE, KeyspaceCreateOptions::default)?;

        match meta.get(META_CONFIG_KEY)? {
            Some(config) => {
                let version = read_u32(&config, "store config")?;
                if version != STORE_VERSION {
                    error!(
                        stored_version = version,
                        expected_version = STORE_VERSION,
                        "store version mismatch"
                    );
                    return Err(Error::StoreVersionMismatch {
                        expected: STORE_VERSION,
                        found: version,
                    });
                }
                trace!(version = version, "store version verified");
            }
            None if options.create_if_missing => {
                Self::initialize(&db, &meta)?;
                info!(path = %path.display(), version = STORE_VERSION, "store initialized");
            }
            None => {
                error!(path = %path.display(), "store not initialized - no config found");
                return Err(Error::NotInitialized(path.display().to_string()));
            }
        }

        let families = Self::load_families(&db, &meta)?;
        let versions = VersionStore::open(&db, &options)?;

        info!(path = %path.display(), "store opened");
        Ok(Self {
            db,
            meta,
            families: RwLock::new(families),
            versions,
            options,
        })
    }

    fn initialize(db: &Database, meta: &Keyspace) -> Result<()> {
        let mut batch = db.batch();
        batch.insert(meta, META_CONFIG_KEY, STORE_VERSION.to_le_bytes());
        batch.insert(
            meta,
            META_NEXT_ID_KEY,
            (DEFAULT_FAMILY_ID + 1).to_le_bytes(),
        );
        batch.insert(
            meta,
            family_meta_key(DEFAULT_FAMILY).as_str(),
            DEFAULT_FAMILY_ID.to_le_bytes(),
        );
        batch.commit()?;
        db.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn load_families(db: &Database, meta: &Keyspace) -> Result<Registry> {
        let next_id = match meta.get(META_NEXT_ID_KEY)? {
            Some(raw) => read_u32(&raw, "next family id")?,
            None => DEFAULT_FAMILY_ID + 1,
        };
        let mut registry = Registry::new(next_id);

        for kv in meta.prefix(META_FAMILIES_PREFIX) {
            let (key, value) = kv.into_inner()?;
            let name = key
                .get(META_FAMILIES_PREFIX.len()..)
                .map(String::from_utf8_lossy)
                .ok_or_else(|| Error::corruption("bad family metadata key"))?
                .into_owned();
            let id = read_u32(&value, "family id")?;
            let keyspace =
                db.keyspace(&ColumnFamily::keyspace_name(id), KeyspaceCreateOptions::default)?;
            trace!(family = %name, id = id, "family loaded");
            registry.insert(&name, id, keyspace);
        }

        if !registry.contains(DEFAULT_FAMILY) {
            return Err(Error::corruption("default column family is missing"));
        }
        Ok(registry)
    }

    /// Persist everything and close the store.
    pub fn close(self) -> Result<()> {
        self.db.persist(PersistMode::SyncAll)?;
        info!(path = %self.options.path.display(), "store closed");
        Ok(())
    }

    /// Force all buffered writes to stable storage.
    pub fn flush(&self) -> Result<()> {
        self.db.persist(PersistMode::SyncAll)?;
        debug!("store flushed");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // Column families

    /// Handle to the `default` family.
    pub fn default_column_family(&self) -> ColumnFamily {
        ColumnFamily::new(DEFAULT_FAMILY_ID, DEFAULT_FAMILY)
    }

    /// Create a family with a fresh identifier.
    ///
    /// Fails with [`Error::FamilyExists`] if `name` is already registered.
    pub fn create_column_family(&self, name: &str) -> Result<ColumnFamily> {
        if name.is_empty() {
            return Err(Error::invalid("column family name must not be empty"));
        }
        let mut families = self.write_families();
        if families.contains(name) {
            warn!(family = name, "column family already exists");
            return Err(Error::FamilyExists(name.to_string()));
        }

        let id = families.next_id();
        let next_id = id
            .checked_add(1)
            .ok_or_else(|| Error::invalid("column family identifiers exhausted"))?;
        let keyspace =
            self.db
                .keyspace(&ColumnFamily::keyspace_name(id), KeyspaceCreateOptions::default)?;

        let mut batch = self.db.batch();
        batch.insert(&self.meta, family_meta_key(name).as_str(), id.to_le_bytes());
        batch.insert(&self.meta, META_NEXT_ID_KEY, next_id.to_le_bytes());
        batch.commit()?;
        self.persist()?;

        info!(family = name, id = id, "column family created");
        Ok(families.insert(name, id, keyspace))
    }

    /// Drop a family and delete its records.
    ///
    /// Dropping an unknown or already dropped family is a no-op. The
    /// `default` family cannot be dropped.
    pub fn drop_column_family(&self, cf: &ColumnFamily) -> Result<()> {
        if cf.id() == DEFAULT_FAMILY_ID {
            warn!("refusing to drop the default column family");
            return Err(Error::invalid("the default column family cannot be dropped"));
        }
        let mut families = self.write_families();
        let Some(keyspace) = families.remove(cf) else {
            debug!(family = cf.name(), id = cf.id(), "drop of unknown column family ignored");
            return Ok(());
        };

        let mut batch = self.db.batch();
        batch.remove(&self.meta, family_meta_key(cf.name()).as_str());
        let mut cleared = 0usize;
        for kv in keyspace.iter() {
            let key = kv.key()?;
            batch.remove(&keyspace, key);
            cleared += 1;
        }
        batch.commit()?;
        self.persist()?;

        info!(family = cf.name(), id = cf.id(), cleared = cleared, "column family dropped");
        Ok(())
    }

    /// Look up a live family by name.
    pub fn column_family(&self, name: &str) -> Option<ColumnFamily> {
        self.read_families().lookup(name)
    }

    /// All live families, ordered by identifier.
    pub fn list_column_families(&self) -> Vec<ColumnFamily> {
        self.read_families().list()
    }

    // Point operations on the default family

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_cf(&self.default_column_family(), key, value)
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.get_cf(&self.default_column_family(), key)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.delete_cf(&self.default_column_family(), key)
    }

    pub fn exist(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.exist_cf(&self.default_column_family(), key)
    }

    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        self.write_cf(&self.default_column_family(), batch)
    }

    pub fn new_iterator(&self) -> Result<RecordIterator> {
        self.new_iterator_cf(&self.default_column_family())
    }

    /// Number of live keys in the default family.
    pub fn len(&self) -> Result<usize> {
        self.len_cf(&self.default_column_family())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    // Point operations on a family

    /// Insert or overwrite `key`.
    pub fn put_cf(
        &self,
        cf: &ColumnFamily,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        let (key, value) = (key.as_ref(), value.as_ref());
        check_key(key, self.options.max_key_size)?;
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        keyspace.insert(key, value)?;
        self.persist()?;
        trace!(family = cf.name(), key_len = key.len(), value_len = value.len(), "put");
        Ok(())
    }

    /// Current value of `key`, `None` if absent.
    pub fn get_cf(&self, cf: &ColumnFamily, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        if key.len() > self.options.max_key_size {
            trace!(family = cf.name(), key_len = key.len(), "get of oversized key");
            return Ok(None);
        }
        let value = keyspace.get(key)?;
        trace!(family = cf.name(), key_len = key.len(), found = value.is_some(), "get");
        Ok(value.map(|v| v.to_vec()))
    }

    /// Remove `key`. Removing an absent key succeeds.
    pub fn delete_cf(&self, cf: &ColumnFamily, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        check_key(key, self.options.max_key_size)?;
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        keyspace.remove(key)?;
        self.persist()?;
        trace!(family = cf.name(), key_len = key.len(), "delete");
        Ok(())
    }

    pub fn exist_cf(&self, cf: &ColumnFamily, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        if key.len() > self.options.max_key_size {
            return Ok(false);
        }
        Ok(keyspace.contains_key(key)?)
    }

    /// Apply every operation in `batch` to `cf` atomically.
    pub fn write_cf(&self, cf: &ColumnFamily, batch: &WriteBatch) -> Result<()> {
        self.write_group(&[(cf, batch)])
    }

    /// Apply batches for several families as one atomic commit.
    ///
    /// When the same family and key appear more than once, the last
    /// operation in group order wins.
    pub fn write_group(&self, group: &[(&ColumnFamily, &WriteBatch)]) -> Result<()> {
        let families = self.read_families();

        let mut keyspaces: HashMap<u32, &Keyspace> = HashMap::new();
        let mut ops: BTreeMap<(u32, &[u8]), &BatchOp> = BTreeMap::new();
        for (cf, batch) in group {
            let keyspace = families.resolve(cf)?;
            keyspaces.insert(cf.id(), keyspace);
            for (key, op) in batch.squashed() {
                check_key(key, self.options.max_key_size)?;
                ops.insert((cf.id(), key), op);
            }
        }
        if ops.is_empty() {
            trace!("empty write batch skipped");
            return Ok(());
        }

        let mut commit = self.db.batch();
        for ((id, key), op) in &ops {
            let keyspace = keyspaces
                .get(id)
                .ok_or_else(|| Error::FamilyNotFound(format!("id {}", id)))?;
            match op {
                BatchOp::Put { value, .. } => commit.insert(keyspace, *key, value.as_slice()),
                BatchOp::Delete { .. } => commit.remove(keyspace, *key),
            }
        }
        commit.commit()?;
        self.persist()?;

        debug!(families = keyspaces.len(), ops = ops.len(), "write batch committed");
        Ok(())
    }

    // Iteration

    /// Iterator over a snapshot of the whole family, taken now.
    pub fn new_iterator_cf(&self, cf: &ColumnFamily) -> Result<RecordIterator> {
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        let mut records = Vec::new();
        for kv in keyspace.iter() {
            let (key, value) = kv.into_inner()?;
            records.push((key.to_vec(), value.to_vec()));
        }
        trace!(family = cf.name(), records = records.len(), "iterator created");
        Ok(RecordIterator::from_sorted(records))
    }

    /// Iterator over keys in `start..end` of one family.
    ///
    /// Bounds longer than the key limit are rejected.
    pub fn new_range_iterator_cf(
        &self,
        cf: &ColumnFamily,
        start: impl AsRef<[u8]>,
        end: impl AsRef<[u8]>,
    ) -> Result<RecordIterator> {
        let (start, end) = (start.as_ref(), end.as_ref());
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        let limit = self.options.max_key_size;
        if start.len() > limit || end.len() > limit {
            return Err(Error::invalid(format!(
                "range bound longer than the {} byte key limit",
                limit
            )));
        }
        if start >= end {
            return Ok(RecordIterator::empty());
        }
        let mut records = Vec::new();
        for kv in keyspace.range(start..end) {
            let (key, value) = kv.into_inner()?;
            records.push((key.to_vec(), value.to_vec()));
        }
        Ok(RecordIterator::from_sorted(records))
    }

    /// Number of live keys in one family.
    pub fn len_cf(&self, cf: &ColumnFamily) -> Result<usize> {
        let families = self.read_families();
        let keyspace = families.resolve(cf)?;
        let mut count = 0;
        for kv in keyspace.iter() {
            kv.key()?;
            count += 1;
        }
        Ok(count)
    }

    // Versioned maps and blobs

    /// The version chain engine sharing this store's database.
    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn init_map(&self, name: &str) -> Result<()> {
        self.versions.init_map(name)
    }

    pub fn start_map_batch(&self, name: &str) -> Result<MapBatch<'_>> {
        self.versions.start_map_batch(name)
    }

    pub fn get_map(&self, name: &str, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.versions.get_map(name, key)
    }

    pub fn get_map_at(
        &self,
        name: &str,
        key: impl AsRef<[u8]>,
        version: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        self.versions.get_map_at(name, key, version)
    }

    pub fn put_blob(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<Hash> {
        self.versions.put_blob(key, value)
    }

    pub fn get_blob(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.versions.get_blob(key)
    }

    pub fn get_blob_at(&self, key: impl AsRef<[u8]>, version: &Hash) -> Result<Option<Vec<u8>>> {
        self.versions.get_blob_at(key, version)
    }

    pub fn previous_version(
        &self,
        resource: impl AsRef<[u8]>,
        version: &Hash,
    ) -> Result<Option<Hash>> {
        self.versions.previous_version(resource, version)
    }

    fn persist(&self) -> Result<()> {
        self.db.persist(self.options.durability.persist_mode())?;
        Ok(())
    }

    fn read_families(&self) -> RwLockReadGuard<'_, Registry> {
        self.families.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_families(&self) -> RwLockWriteGuard<'_, Registry> {
        self.families.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn family_meta_key(name: &str) -> String {
    format!("{}{}", META_FAMILIES_PREFIX, name)
}

fn read_u32(raw: &[u8], what: &str) -> Result<u32> {
    let arr: [u8; 4] = raw
        .try_into()
        .map_err(|_| Error::corruption(format!("invalid {} format", what)))?;
    Ok(u32::from_le_bytes(arr))
}
