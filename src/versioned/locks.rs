//! Per-resource exclusion for in-flight batches.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

/// Set of resources that currently have an accumulation in flight.
#[derive(Default)]
pub(crate) struct ResourceLocks {
    held: Mutex<HashSet<Vec<u8>>>,
    released: Condvar,
}

impl ResourceLocks {
    /// Block until `resource` is free, then hold it until the guard drops.
    pub fn acquire(&self, resource: Vec<u8>) -> ResourceGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&resource) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(resource.clone());
        ResourceGuard {
            locks: self,
            resource,
        }
    }

    /// Hold `resource` if it is free right now.
    pub fn try_acquire(&self, resource: Vec<u8>) -> Option<ResourceGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(resource.clone()) {
            return None;
        }
        Some(ResourceGuard {
            locks: self,
            resource,
        })
    }

    fn release(&self, resource: &[u8]) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(resource);
        drop(held);
        self.released.notify_all();
    }
}

pub(crate) struct ResourceGuard<'a> {
    locks: &'a ResourceLocks,
    resource: Vec<u8>,
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.resource);
    }
}
