//! Immutable version nodes and their binary encoding.
//!
//! ```text
//! +---------------------+
//! | magic "CKVN"        | 4 bytes
//! | format              | u8 (1)
//! | kind                | u8 (0 = map, 1 = blob)
//! | resource            | u32 LE length + bytes
//! | has predecessor     | u8 (0 / 1)
//! | predecessor token   | 32 bytes, only if present
//! | body                | map: u32 LE op count, then ops
//! |                     |   op: tag u8 (0 = put, 1 = delete),
//! |                     |       u32 LE key length + key,
//! |                     |       put only: u32 LE value length + value
//! |                     | blob: u32 LE length + bytes
//! | crc32               | u32 LE over everything above
//! +---------------------+
//! ```
//!
//! The version token of a node is the SHA-256 of the encoding without the
//! CRC trailer. Map ops are stored sorted by key with one op per key.

use std::collections::BTreeMap;

use super::hash::Hash;
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"CKVN";
const FORMAT: u8 = 1;
const CRC_LEN: usize = 4;

const TAG_PUT: u8 = 0;
const TAG_DELETE: u8 = 1;

/// Which kind of versioned resource a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Map,
    Blob,
}

impl ResourceKind {
    fn tag(self) -> u8 {
        match self {
            ResourceKind::Map => 0,
            ResourceKind::Blob => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ResourceKind::Map),
            1 => Ok(ResourceKind::Blob),
            other => Err(Error::corruption(format!("unknown resource kind {}", other))),
        }
    }

    /// Key of the resource's head pointer.
    pub(crate) fn head_key(self, resource: &[u8]) -> Vec<u8> {
        let prefix: &[u8] = match self {
            ResourceKind::Map => b"map/",
            ResourceKind::Blob => b"blob/",
        };
        let mut key = Vec::with_capacity(prefix.len() + resource.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(resource);
        key
    }
}

/// One change to a map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOp {
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeBody {
    Map(BTreeMap<Vec<u8>, MapOp>),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionNode {
    pub resource: Vec<u8>,
    pub predecessor: Option<Hash>,
    pub body: NodeBody,
}

impl VersionNode {
    pub fn map(resource: &[u8], predecessor: Option<Hash>, ops: BTreeMap<Vec<u8>, MapOp>) -> Self {
        Self {
            resource: resource.to_vec(),
            predecessor,
            body: NodeBody::Map(ops),
        }
    }

    pub fn blob(resource: &[u8], predecessor: Option<Hash>, value: Vec<u8>) -> Self {
        Self {
            resource: resource.to_vec(),
            predecessor,
            body: NodeBody::Blob(value),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self.body {
            NodeBody::Map(_) => ResourceKind::Map,
            NodeBody::Blob(_) => ResourceKind::Blob,
        }
    }

    pub fn belongs_to(&self, kind: ResourceKind, resource: &[u8]) -> bool {
        self.kind() == kind && self.resource == resource
    }

    /// The op this version applied to `key`, if any.
    pub fn map_op(&self, key: &[u8]) -> Option<&MapOp> {
        match &self.body {
            NodeBody::Map(ops) => ops.get(key),
            NodeBody::Blob(_) => None,
        }
    }

    /// Encode the node, returning its bytes and version token.
    pub fn encode(&self) -> Result<(Vec<u8>, Hash)> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT);
        buf.push(self.kind().tag());
        put_bytes(&mut buf, &self.resource)?;

        match &self.predecessor {
            Some(pred) => {
                buf.push(1);
                buf.extend_from_slice(pred.as_bytes());
            }
            None => buf.push(0),
        }

        match &self.body {
            NodeBody::Map(ops) => {
                put_len(&mut buf, ops.len())?;
                for (key, op) in ops {
                    match op {
                        MapOp::Put(value) => {
                            buf.push(TAG_PUT);
                            put_bytes(&mut buf, key)?;
                            put_bytes(&mut buf, value)?;
                        }
                        MapOp::Delete => {
                            buf.push(TAG_DELETE);
                            put_bytes(&mut buf, key)?;
                        }
                    }
                }
            }
            NodeBody::Blob(value) => put_bytes(&mut buf, value)?,
        }

        let token = Hash::digest(&buf);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok((buf, token))
    }

    /// Decode a node, validating magic, format and checksum.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let split = data
            .len()
            .checked_sub(CRC_LEN)
            .ok_or_else(|| Error::corruption("version node shorter than its checksum"))?;
        let (body, trailer) = data.split_at(split);
        let stored = u32::from_le_bytes(
            trailer
                .try_into()
                .map_err(|_| Error::corruption("bad checksum trailer"))?,
        );
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(Error::corruption(format!(
                "version node checksum mismatch: expected {:#010x}, got {:#010x}",
                stored, actual
            )));
        }

        let mut reader = Reader::new(body);
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(Error::corruption("bad version node magic"));
        }
        let format = reader.u8()?;
        if format != FORMAT {
            return Err(Error::corruption(format!("unsupported node format {}", format)));
        }
        let kind = ResourceKind::from_tag(reader.u8()?)?;
        let resource = reader.bytes()?.to_vec();
        let predecessor = match reader.u8()? {
            0 => None,
            1 => Some(Hash::from_slice(reader.take(Hash::LEN)?)?),
            other => {
                return Err(Error::corruption(format!("bad predecessor flag {}", other)));
            }
        };

        let body = match kind {
            ResourceKind::Map => {
                let count = reader.u32()?;
                let mut ops = BTreeMap::new();
                for _ in 0..count {
                    let tag = reader.u8()?;
                    let key = reader.bytes()?.to_vec();
                    let op = match tag {
                        TAG_PUT => MapOp::Put(reader.bytes()?.to_vec()),
                        TAG_DELETE => MapOp::Delete,
                        other => {
                            return Err(Error::corruption(format!("unknown map op tag {}", other)));
                        }
                    };
                    if ops.insert(key, op).is_some() {
                        return Err(Error::corruption("duplicate key in version node"));
                    }
                }
                NodeBody::Map(ops)
            }
            ResourceKind::Blob => NodeBody::Blob(reader.bytes()?.to_vec()),
        };

        if !reader.is_empty() {
            return Err(Error::corruption("trailing bytes in version node"));
        }

        Ok(Self {
            resource,
            predecessor,
            body,
        })
    }

    /// Recompute the token of an encoded node.
    pub fn token_of(data: &[u8]) -> Result<Hash> {
        let split = data
            .len()
            .checked_sub(CRC_LEN)
            .ok_or_else(|| Error::corruption("version node shorter than its checksum"))?;
        let (body, _) = data.split_at(split);
        Ok(Hash::digest(body))
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::invalid(format!("length {} does not fit a version node", len)))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    put_len(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.data.len() {
            return Err(Error::corruption(format!(
                "version node truncated: need {} bytes, {} left",
                n,
                self.data.len()
            )));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = self.take(1)?;
        Ok(byte.first().copied().unwrap_or_default())
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        let arr: [u8; 4] = raw
            .try_into()
            .map_err(|_| Error::corruption("truncated length field"))?;
        Ok(u32::from_le_bytes(arr))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ops() -> BTreeMap<Vec<u8>, MapOp> {
        let mut ops = BTreeMap::new();
        ops.insert(b"k1".to_vec(), MapOp::Put(b"v1".to_vec()));
        ops.insert(b"k2".to_vec(), MapOp::Delete);
        ops
    }

    #[test]
    fn test_map_node_decodes_to_itself() {
        let pred = Hash::digest(b"previous");
        let node = VersionNode::map(b"m", Some(pred), sample_ops());
        let (bytes, token) = node.encode().unwrap();

        let decoded = VersionNode::decode(&bytes).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(VersionNode::token_of(&bytes).unwrap(), token);
        assert_eq!(decoded.map_op(b"k1"), Some(&MapOp::Put(b"v1".to_vec())));
        assert_eq!(decoded.map_op(b"k2"), Some(&MapOp::Delete));
        assert_eq!(decoded.map_op(b"k3"), None);
    }

    #[test]
    fn test_token_depends_on_history_and_name() {
        let origin = VersionNode::map(b"m", None, sample_ops()).encode().unwrap().1;
        let again = VersionNode::map(b"m", None, sample_ops()).encode().unwrap().1;
        assert_eq!(origin, again);

        let later = VersionNode::map(b"m", Some(origin), sample_ops()).encode().unwrap().1;
        assert_ne!(origin, later);

        let other_map = VersionNode::map(b"n", None, sample_ops()).encode().unwrap().1;
        assert_ne!(origin, other_map);

        let blob = VersionNode::blob(b"m", None, b"v1".to_vec()).encode().unwrap().1;
        assert_ne!(origin, blob);
    }

    #[test]
    fn test_flipped_byte_is_corruption() {
        let node = VersionNode::blob(b"photo", None, vec![7; 64]);
        let (mut bytes, _) = node.encode().unwrap();
        if let Some(byte) = bytes.get_mut(20) {
            *byte ^= 0xff;
        }
        assert!(VersionNode::decode(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn test_truncated_is_corruption() {
        assert!(VersionNode::decode(b"CK").unwrap_err().is_corruption());

        let (bytes, _) = VersionNode::blob(b"b", None, b"data".to_vec()).encode().unwrap();
        let short = &bytes[..bytes.len() - 6];
        assert!(VersionNode::decode(short).unwrap_err().is_corruption());
    }

    #[test]
    fn test_head_keys_separate_kinds() {
        assert_eq!(ResourceKind::Map.head_key(b"x"), b"map/x".to_vec());
        assert_eq!(ResourceKind::Blob.head_key(b"x"), b"blob/x".to_vec());
    }
}
