//! Column-family key-value store with versioned maps and blobs.
//!
//! `chainkv` stores raw byte records in named column families on top of the
//! fjall LSM-tree, and keeps a content-addressed version history for named
//! maps and blobs next to them.
//!
//! # Quick Start
//!
//! ```ignore
//! use chainkv::prelude::*;
//!
//! let db = Db::open(".chainkv")?;
//!
//! // Plain records
//! db.put("key1", "val1")?;
//! let mut batch = WriteBatch::new();
//! batch.put("k2", "v2");
//! batch.delete("key1");
//! db.write(&batch)?;
//!
//! // Versioned maps
//! db.init_map("settings")?;
//! let mut batch = db.start_map_batch("settings")?;
//! batch.put("theme", "dark")?;
//! batch.sync()?;
//! let v1 = batch.write()?;
//! drop(batch);
//!
//! assert_eq!(db.get_map_at("settings", "theme", &v1)?, Some(b"dark".to_vec()));
//! ```
//!
//! # Modules
//!
//! - [`kv`] - Record store, column families, write batches and iterators
//! - [`versioned`] - Version chains for maps and blobs
//! - [`status`] - Status codes for callers that report results as values
//! - [`config`] - Store options, optionally loaded from TOML
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `config` - Enable loading [`Options`] from TOML files
//! - `full` - Enable all features

pub mod config;
mod error;
pub mod kv;
mod logging;
pub mod prelude;
pub mod status;
pub mod versioned;

pub use error::{Error, Result};

pub use config::{Durability, Options};
#[cfg(feature = "config")]
pub use config::ConfigError;
pub use kv::{BatchOp, ColumnFamily, DEFAULT_FAMILY, Db, RecordIterator, WriteBatch};
pub use status::{Code, Status};
pub use versioned::{Hash, MapBatch, MapOp, ResourceKind, VersionStore};
