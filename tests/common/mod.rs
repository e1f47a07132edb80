//! Common test utilities and fixtures.

#![allow(dead_code)]

use chainkv::{Db, Options};
use tempfile::TempDir;

/// A store in a temporary directory that lives as long as the fixture.
pub struct TestDb {
    pub db: Db,
    dir: TempDir, // Keep alive for test duration
}

impl TestDb {
    pub fn new() -> anyhow::Result<Self> {
        init_tracing();
        let dir = TempDir::new()?;
        let db = Db::open(dir.path().join("store"))?;
        Ok(Self { db, dir })
    }

    /// Close the store and open it again from the same directory.
    pub fn reopen(self) -> anyhow::Result<Self> {
        let Self { db, dir } = self;
        db.close()?;
        let db = Db::open_with(Options::new(dir.path().join("store")).create_if_missing(false))?;
        Ok(Self { db, dir })
    }

    pub fn dir(&self) -> &TempDir {
        &self.dir
    }
}

/// Install a test subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keys of an iterator from the current position to the end.
pub fn collect_forward(it: &mut chainkv::RecordIterator) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while let Some(key) = it.key() {
        keys.push(key.to_vec());
        it.next();
    }
    keys
}

/// Keys of an iterator from the current position to the start.
pub fn collect_backward(it: &mut chainkv::RecordIterator) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while let Some(key) = it.key() {
        keys.push(key.to_vec());
        it.prev();
    }
    keys
}
