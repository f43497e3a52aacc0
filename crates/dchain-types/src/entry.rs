//! Chain entries: one stored revision of one group.

use std::fmt;

use crate::value::Value;
use crate::SeqNo;

/// One revision as held by the storage backend.
///
/// `image` is the framed persisted payload (tag field plus content or
/// diff bytes, see `dchain-codec`); the backend treats it as opaque.
/// `raw_len` records the uncompressed content length at append time so
/// cascade deletion and statistics can account for removed entries
/// without reconstructing them.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChainEntry {
    /// Position within the group's chain, 1-based and contiguous.
    pub seq: SeqNo,
    /// Caller-visible order key this revision was inserted under.
    pub order_key: Value,
    /// Uncompressed content length in bytes.
    pub raw_len: u32,
    /// Framed persisted payload.
    pub image: Vec<u8>,
}

impl ChainEntry {
    /// Stored (compressed) size of this entry in bytes.
    #[inline]
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.image.len()
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("seq", &self.seq)
            .field("order_key", &self.order_key)
            .field("raw_len", &self.raw_len)
            .field("image_len", &self.image.len())
            .finish()
    }
}
