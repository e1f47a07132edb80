//! Content digests used as version tokens.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A SHA-256 digest. Version tokens and per-write tokens are both `Hash`es.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; Hash::LEN]);

impl Hash {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hash from raw bytes; the slice must be exactly [`Hash::LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            Error::invalid(format!(
                "version token must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Digest of `data`.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Token for a single map write: a domain tag, then length-prefixed key and value.
    pub fn of_entry(key: &[u8], value: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"chainkv/entry");
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != Self::LEN * 2 || !s.is_ascii() {
            return Err(Error::invalid(format!("not a {}-digit hex token: {}", Self::LEN * 2, s)));
        }
        let mut out = [0u8; Self::LEN];
        for (byte, pair) in out.iter_mut().zip(s.as_bytes().chunks_exact(2)) {
            let digits = std::str::from_utf8(pair).map_err(|e| Error::invalid(e.to_string()))?;
            *byte = u8::from_str_radix(digits, 16)
                .map_err(|_| Error::invalid(format!("bad hex digits '{}' in token", digits)))?;
        }
        Ok(Self(out))
    }
}
