//! Delta codec boundary and persisted framing for DeltaChain.
//!
//! This crate owns the two binary contracts at the compression boundary:
//!
//! - **Entry frame** ([`frame`]): the persisted representation of one
//!   chain entry, carrying the delta tag in a fixed-width field whose
//!   maximum value is the keyframe sentinel.
//! - **Diff payloads** ([`DeltaCodec`], [`block`]): opaque, deterministic
//!   `encode(base, target)` / `decode(base, diff)` pairs. The built-in
//!   [`BlockDelta`] codec produces copy/insert opcode streams with an
//!   integrity checksum over the reconstructed target.
//!
//! Content records ([`content`]) frame the per-column payloads of one
//! revision into the single byte string the chain stores and diffs.

pub mod block;
pub mod content;
pub mod frame;

pub use block::BlockDelta;

use std::fmt;

/// Errors raised by entry framing, content records, and diff decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Entry frame shorter than its fixed header.
    FrameTruncated { actual_len: usize },
    /// Entry frame magic bytes do not match.
    FrameInvalidMagic { actual: [u8; 2] },
    /// Entry frame version is unsupported.
    FrameUnsupportedVersion { version: u8 },
    /// Persisted tag field holds a value no tag encodes to.
    InvalidTag { raw: u16 },
    /// Diff payload shorter than its fixed header.
    DiffTruncatedHeader { actual_len: usize },
    /// Diff magic bytes do not match.
    DiffInvalidMagic { actual: [u8; 2] },
    /// Diff version is unsupported.
    DiffUnsupportedVersion { version: u8 },
    /// Opcode stream ends mid-instruction.
    TruncatedOpcode { at: usize },
    /// Unknown opcode byte.
    UnknownOpcode { opcode: u8, at: usize },
    /// Copy instruction reaches outside the base.
    CopyOutOfBounds {
        offset: usize,
        len: usize,
        base_len: usize,
    },
    /// Reconstructed target length disagrees with the header.
    TargetLengthMismatch { expected: usize, actual: usize },
    /// Reconstructed target checksum disagrees with the header.
    ChecksumMismatch { expected: u64, actual: u64 },
    /// Content record ends inside a column payload.
    TruncatedColumn {
        at: usize,
        expected_len: usize,
        remaining: usize,
    },
    /// A single payload exceeds the u32 framing limit.
    PayloadTooLarge { len: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTruncated { actual_len } => {
                write!(
                    f,
                    "truncated entry frame: expected >= {}, got {actual_len}",
                    frame::FRAME_HEADER_BYTES
                )
            }
            Self::FrameInvalidMagic { actual } => {
                write!(f, "invalid entry frame magic: {actual:?}")
            }
            Self::FrameUnsupportedVersion { version } => {
                write!(f, "unsupported entry frame version: {version}")
            }
            Self::InvalidTag { raw } => write!(f, "invalid persisted tag value: {raw}"),
            Self::DiffTruncatedHeader { actual_len } => {
                write!(
                    f,
                    "truncated diff header: expected >= {}, got {actual_len}",
                    block::DIFF_HEADER_BYTES
                )
            }
            Self::DiffInvalidMagic { actual } => write!(f, "invalid diff magic: {actual:?}"),
            Self::DiffUnsupportedVersion { version } => {
                write!(f, "unsupported diff version: {version}")
            }
            Self::TruncatedOpcode { at } => write!(f, "truncated opcode stream at byte {at}"),
            Self::UnknownOpcode { opcode, at } => {
                write!(f, "unknown opcode {opcode:#04x} at byte {at}")
            }
            Self::CopyOutOfBounds {
                offset,
                len,
                base_len,
            } => write!(
                f,
                "copy out of bounds: offset={offset} len={len} base_len={base_len}"
            ),
            Self::TargetLengthMismatch { expected, actual } => write!(
                f,
                "target length mismatch: header says {expected}, reconstructed {actual}"
            ),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "target checksum mismatch: header says {expected:#018x}, reconstructed {actual:#018x}"
            ),
            Self::TruncatedColumn {
                at,
                expected_len,
                remaining,
            } => write!(
                f,
                "truncated column payload at byte {at}: expected {expected_len}, remaining {remaining}"
            ),
            Self::PayloadTooLarge { len } => {
                write!(f, "payload exceeds u32 framing limit: {len} bytes")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// The diff engine contract the chain core relies on.
///
/// Both operations are pure: deterministic for identical inputs and free
/// of side effects. `decode` must reject any `diff` that is not a valid
/// encoding against `base` rather than produce wrong bytes.
pub trait DeltaCodec {
    /// Stable codec name, for diagnostics and introspection.
    fn name(&self) -> &'static str;

    /// Produce a diff that reconstructs `target` from `base`.
    fn encode(&self, base: &[u8], target: &[u8]) -> Vec<u8>;

    /// Reconstruct the target from `base` and `diff`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when `diff` is malformed or does not
    /// verify against `base`.
    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_diagnosable() {
        let err = CodecError::ChecksumMismatch {
            expected: 1,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("0x0000000000000001"));
    }
}
