//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```ignore
//! use chainkv::prelude::*;
//!
//! let db = Db::open(".chainkv")?;
//! let users = db.create_column_family("users")?;
//! db.put_cf(&users, "alice", "admin")?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};
pub use crate::status::{Code, Status};

// Record store
pub use crate::kv::{ColumnFamily, Db, RecordIterator, WriteBatch};

// Version chains
pub use crate::versioned::{Hash, MapBatch, ResourceKind};

// Options
pub use crate::config::{Durability, Options};
