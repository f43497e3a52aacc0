//! Built-in block-matching delta codec.
//!
//! [`BlockDelta`] produces a copy/insert opcode stream: matching runs are
//! encoded as copies out of the base, everything else as literal inserts.
//! The header carries the target length and an xxh3 checksum of the
//! target; decode verifies both, so a diff applied against the wrong base
//! fails loudly instead of yielding wrong bytes.
//!
//! Wire format:
//!
//! ```text
//! magic[2]    = "BD"
//! version[1]  = 1
//! flags[1]    = 0
//! target_len  u32 LE
//! checksum    u64 LE (xxh3 of the target bytes)
//! ops         sequence of:
//!               0x01 COPY   offset:u32 LE, len:u32 LE   (from base)
//!               0x02 INSERT len:u32 LE, data[len]
//! ```

use std::collections::HashMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::{CodecError, DeltaCodec};

/// Diff magic bytes (`"BD"`).
pub const DIFF_MAGIC: [u8; 2] = *b"BD";
/// Diff wire version.
pub const DIFF_VERSION: u8 = 1;
/// Fixed diff header size in bytes.
pub const DIFF_HEADER_BYTES: usize = 16;

/// Minimum length of a base match worth emitting as a copy. Shorter
/// matches cost more in opcode overhead than the literal bytes.
const MIN_MATCH: usize = 12;
/// Base indexing granularity.
const BLOCK: usize = 8;

const OP_COPY: u8 = 0x01;
const OP_INSERT: u8 = 0x02;

/// Greedy block-matching delta codec. Stateless; one value serves the
/// whole process.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockDelta;

impl BlockDelta {
    /// Shared default instance.
    pub const INSTANCE: Self = Self;
}

impl DeltaCodec for BlockDelta {
    fn name(&self) -> &'static str {
        "block-delta-v1"
    }

    fn encode(&self, base: &[u8], target: &[u8]) -> Vec<u8> {
        let mut diff = Vec::with_capacity(DIFF_HEADER_BYTES + target.len() / 4 + 16);
        diff.extend_from_slice(&DIFF_MAGIC);
        diff.push(DIFF_VERSION);
        diff.push(0); // flags
        diff.extend_from_slice(&(target.len() as u32).to_le_bytes());
        diff.extend_from_slice(&xxh3_64(target).to_le_bytes());

        // Index base block hashes. First occurrence wins so the encoding
        // is independent of map iteration order.
        let mut index: HashMap<u64, usize> = HashMap::new();
        if base.len() >= BLOCK {
            let mut off = 0usize;
            while off + BLOCK <= base.len() {
                index.entry(xxh3_64(&base[off..off + BLOCK])).or_insert(off);
                off += BLOCK;
            }
        }

        let mut literal_start = 0usize;
        let mut pos = 0usize;
        while pos + BLOCK <= target.len() {
            let candidate = index
                .get(&xxh3_64(&target[pos..pos + BLOCK]))
                .copied()
                .filter(|&base_off| base[base_off..base_off + BLOCK] == target[pos..pos + BLOCK]);

            let Some(base_off) = candidate else {
                pos += 1;
                continue;
            };

            // Extend the verified block match forward as far as it holds.
            let mut len = BLOCK;
            while base_off + len < base.len()
                && pos + len < target.len()
                && base[base_off + len] == target[pos + len]
            {
                len += 1;
            }

            if len < MIN_MATCH {
                pos += 1;
                continue;
            }

            push_insert(&mut diff, &target[literal_start..pos]);
            push_copy(&mut diff, base_off, len);
            pos += len;
            literal_start = pos;
        }
        push_insert(&mut diff, &target[literal_start..]);

        diff
    }

    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        if diff.len() < DIFF_HEADER_BYTES {
            return Err(CodecError::DiffTruncatedHeader {
                actual_len: diff.len(),
            });
        }
        let magic = [diff[0], diff[1]];
        if magic != DIFF_MAGIC {
            return Err(CodecError::DiffInvalidMagic { actual: magic });
        }
        if diff[2] != DIFF_VERSION {
            return Err(CodecError::DiffUnsupportedVersion { version: diff[2] });
        }
        let expected_len = read_u32(diff, 4) as usize;
        let expected_sum = read_u64(diff, 8);

        let mut out = Vec::with_capacity(expected_len);
        let mut cursor = DIFF_HEADER_BYTES;
        while cursor < diff.len() {
            let opcode = diff[cursor];
            cursor += 1;
            match opcode {
                OP_COPY => {
                    if cursor + 8 > diff.len() {
                        return Err(CodecError::TruncatedOpcode { at: cursor });
                    }
                    let offset = read_u32(diff, cursor) as usize;
                    let len = read_u32(diff, cursor + 4) as usize;
                    cursor += 8;
                    let end = offset
                        .checked_add(len)
                        .ok_or(CodecError::CopyOutOfBounds {
                            offset,
                            len,
                            base_len: base.len(),
                        })?;
                    if end > base.len() {
                        return Err(CodecError::CopyOutOfBounds {
                            offset,
                            len,
                            base_len: base.len(),
                        });
                    }
                    out.extend_from_slice(&base[offset..end]);
                }
                OP_INSERT => {
                    if cursor + 4 > diff.len() {
                        return Err(CodecError::TruncatedOpcode { at: cursor });
                    }
                    let len = read_u32(diff, cursor) as usize;
                    cursor += 4;
                    if cursor + len > diff.len() {
                        return Err(CodecError::TruncatedOpcode { at: cursor });
                    }
                    out.extend_from_slice(&diff[cursor..cursor + len]);
                    cursor += len;
                }
                other => {
                    return Err(CodecError::UnknownOpcode {
                        opcode: other,
                        at: cursor - 1,
                    })
                }
            }
        }

        if out.len() != expected_len {
            return Err(CodecError::TargetLengthMismatch {
                expected: expected_len,
                actual: out.len(),
            });
        }
        let actual_sum = xxh3_64(&out);
        if actual_sum != expected_sum {
            return Err(CodecError::ChecksumMismatch {
                expected: expected_sum,
                actual: actual_sum,
            });
        }
        Ok(out)
    }
}

fn push_copy(diff: &mut Vec<u8>, offset: usize, len: usize) {
    diff.push(OP_COPY);
    diff.extend_from_slice(&(offset as u32).to_le_bytes());
    diff.extend_from_slice(&(len as u32).to_le_bytes());
}

fn push_insert(diff: &mut Vec<u8>, literal: &[u8]) {
    if literal.is_empty() {
        return;
    }
    diff.push(OP_INSERT);
    diff.extend_from_slice(&(literal.len() as u32).to_le_bytes());
    diff.extend_from_slice(literal);
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}
