//! Buffered write batches.

use std::collections::BTreeMap;

/// A single buffered operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// An ordered list of puts and deletes, applied atomically by
/// [`Db::write`](crate::Db::write) or [`Db::write_cf`](crate::Db::write_cf).
///
/// Buffering does no I/O. A batch is not bound to a store and can be reused
/// after [`clear`](Self::clear).
///
/// ```ignore
/// let mut batch = WriteBatch::new();
/// batch.put("a", "1");
/// batch.delete("b");
/// batch.put("c", "3");
/// db.write(&batch)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.ops.push(BatchOp::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        });
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.ops.push(BatchOp::Delete {
            key: key.as_ref().to_vec(),
        });
    }

    /// Discard all buffered operations.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Buffered operations in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// The effective operation per key, in key order.
    ///
    /// Operations in one commit share a sequence number in the storage
    /// engine, so a key must appear at most once; the last operation wins.
    pub(crate) fn squashed(&self) -> BTreeMap<&[u8], &BatchOp> {
        let mut last = BTreeMap::new();
        for op in &self.ops {
            last.insert(op.key(), op);
        }
        last
    }
}
