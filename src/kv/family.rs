//! Column family handles and the in-memory registry of open families.

use std::collections::HashMap;

use fjall::Keyspace;

use crate::error::{Error, Result};

/// Name of the family that always exists.
pub const DEFAULT_FAMILY: &str = "default";

/// Handle to a column family.
///
/// Handles are plain values. A handle goes stale when its family is dropped,
/// and stays stale even if a family with the same name is created again,
/// because identifiers are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnFamily {
    id: u32,
    name: String,
}

impl ColumnFamily {
    pub(crate) fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// fjall keyspace holding this family's records.
    pub(crate) fn keyspace_name(id: u32) -> String {
        format!("cf_{}", id)
    }
}

struct Entry {
    id: u32,
    keyspace: Keyspace,
}

/// Open families by name.
pub(crate) struct Registry {
    families: HashMap<String, Entry>,
    next_id: u32,
}

impl Registry {
    pub(crate) fn new(next_id: u32) -> Self {
        Self {
            families: HashMap::new(),
            next_id,
        }
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.next_id
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    pub(crate) fn insert(&mut self, name: &str, id: u32, keyspace: Keyspace) -> ColumnFamily {
        self.families.insert(name.to_string(), Entry { id, keyspace });
        self.next_id = self.next_id.max(id.saturating_add(1));
        ColumnFamily::new(id, name)
    }

    /// The keyspace behind a live handle.
    pub(crate) fn resolve(&self, cf: &ColumnFamily) -> Result<&Keyspace> {
        match self.families.get(&cf.name) {
            Some(entry) if entry.id == cf.id => Ok(&entry.keyspace),
            _ => Err(Error::FamilyNotFound(cf.name.clone())),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ColumnFamily> {
        self.families
            .get(name)
            .map(|entry| ColumnFamily::new(entry.id, name))
    }

    /// Unregister a live handle, returning its keyspace. Stale handles yield `None`.
    pub(crate) fn remove(&mut self, cf: &ColumnFamily) -> Option<Keyspace> {
        match self.families.get(&cf.name) {
            Some(entry) if entry.id == cf.id => {
                self.families.remove(&cf.name).map(|entry| entry.keyspace)
            }
            _ => None,
        }
    }

    /// All live families, ordered by identifier.
    pub(crate) fn list(&self) -> Vec<ColumnFamily> {
        let mut all: Vec<_> = self
            .families
            .iter()
            .map(|(name, entry)| ColumnFamily::new(entry.id, name.as_str()))
            .collect();
        all.sort_by_key(ColumnFamily::id);
        all
    }
}
