//! Record store: column families, write batches and ordered iteration.
//!
//! Each column family is a fjall keyspace holding raw byte keys and values.
//! Writes go straight to fjall and are persisted before returning; batches
//! are committed as one atomic fjall write batch.

mod batch;
mod db;
mod family;
mod iter;

pub use batch::{BatchOp, WriteBatch};
pub use db::Db;
pub use family::{ColumnFamily, DEFAULT_FAMILY};
pub use iter::RecordIterator;

use crate::error::{Error, Result};

/// Reject keys the store cannot hold.
pub(crate) fn check_key(key: &[u8], max_key_size: usize) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid("key must not be empty"));
    }
    if key.len() > max_key_size {
        return Err(Error::invalid(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            max_key_size
        )));
    }
    Ok(())
}
