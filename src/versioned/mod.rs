//! Version chains for maps and blobs.
//!
//! Each resource's history is a linked list of content-addressed nodes
//! stored in their own keyspaces next to the column families.

mod batch;
mod hash;
mod locks;
mod node;
mod store;

pub use batch::MapBatch;
pub use hash::Hash;
pub use node::{MapOp, ResourceKind};
pub use store::{MAX_MAP_NAME_LEN, VersionStore};
