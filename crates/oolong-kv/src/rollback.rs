//! Undo records for the rollback segment.
//!
//! Every early flush of a batch session pairs each data write with an
//! undo entry keyed `rollback_ns ‖ sequence`. A commit marker (the
//! highest possible sequence) is written last, in the same batch as the
//! final flush, so recovery can tell a completed commit from an
//! interrupted one.

use oolong_common::namespace::Namespace;
use oolong_common::{Error, Result};

/// Sequence number reserved for the commit marker.
const MARKER_SEQ: u64 = u64::MAX;

/// Builds the undo-entry key for `seq` under the rollback namespace.
pub(crate) fn undo_key(ns: Namespace, seq: u64) -> Vec<u8> {
    let mut key = oolong_encoding::namespace_prefix(ns);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Builds the commit-marker key. Sorts after every undo entry.
pub(crate) fn marker_key(ns: Namespace) -> Vec<u8> {
    undo_key(ns, MARKER_SEQ)
}

/// Returns true if `key` is the commit marker of namespace `ns`.
pub(crate) fn is_marker(ns: Namespace, key: &[u8]) -> bool {
    key == marker_key(ns).as_slice()
}

/// A single undo entry: the mutated key and its pre-image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UndoRecord {
    /// The data key that was written or deleted.
    pub key: Vec<u8>,
    /// The committed value before the write; `None` if the key was absent.
    pub previous: Option<Vec<u8>>,
}

impl UndoRecord {
    /// Serializes the record: presence flag, key length, key, value.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(5 + self.key.len() + self.previous.as_ref().map_or(0, Vec::len));
        buf.push(u8::from(self.previous.is_some()));
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.key);
        if let Some(prev) = &self.previous {
            buf.extend_from_slice(prev);
        }
        buf
    }

    /// Deserializes a record previously produced by [`UndoRecord::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (&flag, rest) = buf
            .split_first()
            .ok_or_else(|| Error::corruption("empty undo record"))?;
        let len_bytes: [u8; 4] = rest
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::corruption("truncated undo record header"))?;
        let key_len = u32::from_be_bytes(len_bytes) as usize;
        let rest = &rest[4..];
        if rest.len() < key_len {
            return Err(Error::corruption("truncated undo record key"));
        }
        let (key, value) = rest.split_at(key_len);
        let previous = match flag {
            0 => None,
            1 => Some(value.to_vec()),
            other => {
                return Err(Error::corruption(format!(
                    "invalid undo record flag {other}"
                )))
            }
        };
        Ok(Self {
            key: key.to_vec(),
            previous,
        })
    }
}
