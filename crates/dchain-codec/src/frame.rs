//! Persisted entry frame.
//!
//! Every stored chain entry is framed as:
//!
//! ```text
//! magic[2]   = "CE"
//! version[1] = 1
//! flags[1]   = 0
//! tag[2]     little-endian u16; 0xFFFF is the keyframe sentinel,
//!            1..=0xFFFE are delta distances, 0 is invalid
//! payload    raw content (keyframe) or codec diff (delta)
//! ```
//!
//! The tag width is a silent-corruption hazard: a writer and reader
//! disagreeing on the field width would shear every payload by the
//! difference. The width is therefore pinned by constants here and swept
//! by tests across the whole configurable depth range, including the
//! sentinel boundary.

use dchain_types::{DeltaTag, KEYFRAME_SENTINEL};

use crate::CodecError;

/// Entry frame magic bytes (`"CE"`).
pub const FRAME_MAGIC: [u8; 2] = *b"CE";
/// Entry frame wire version.
pub const FRAME_VERSION: u8 = 1;
/// Fixed header size in bytes.
pub const FRAME_HEADER_BYTES: usize = 6;

/// Frame a tag and payload into the persisted image.
#[must_use]
pub fn encode_entry(tag: DeltaTag, payload: &[u8]) -> Vec<u8> {
    let mut image = Vec::with_capacity(FRAME_HEADER_BYTES + payload.len());
    image.extend_from_slice(&FRAME_MAGIC);
    image.push(FRAME_VERSION);
    image.push(0); // flags
    image.extend_from_slice(&tag.raw().to_le_bytes());
    image.extend_from_slice(payload);
    image
}

/// Split a persisted image into its tag and payload.
///
/// # Errors
///
/// Returns a [`CodecError`] when the image is truncated, carries the
/// wrong magic or version, or holds a tag value no entry can have.
pub fn decode_entry(image: &[u8]) -> Result<(DeltaTag, &[u8]), CodecError> {
    if image.len() < FRAME_HEADER_BYTES {
        return Err(CodecError::FrameTruncated {
            actual_len: image.len(),
        });
    }
    let magic = [image[0], image[1]];
    if magic != FRAME_MAGIC {
        return Err(CodecError::FrameInvalidMagic { actual: magic });
    }
    if image[2] != FRAME_VERSION {
        return Err(CodecError::FrameUnsupportedVersion { version: image[2] });
    }
    let raw = u16::from_le_bytes([image[4], image[5]]);
    let tag = if raw == KEYFRAME_SENTINEL {
        DeltaTag::Keyframe
    } else {
        DeltaTag::delta(raw).ok_or(CodecError::InvalidTag { raw })?
    };
    Ok((tag, &image[FRAME_HEADER_BYTES..]))
}
