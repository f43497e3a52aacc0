//! Content records: per-column payload framing.
//!
//! One revision carries one payload per configured delta column. The
//! chain stores and diffs a single byte string, so the payloads are
//! framed as a sequence of `u32` LE length-prefixed fields. The record is
//! self-delimiting; the column count is validated against the relation
//! configuration by the engine, not here.

use crate::CodecError;

/// Frame per-column payloads into one content record.
///
/// # Errors
///
/// Returns [`CodecError::PayloadTooLarge`] when a single payload exceeds
/// the `u32` framing limit.
pub fn encode_columns(columns: &[&[u8]]) -> Result<Vec<u8>, CodecError> {
    let mut record = Vec::with_capacity(columns.iter().map(|c| c.len() + 4).sum());
    for column in columns {
        let len = u32::try_from(column.len())
            .map_err(|_| CodecError::PayloadTooLarge { len: column.len() })?;
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(column);
    }
    Ok(record)
}

/// Split a content record back into per-column payloads.
///
/// # Errors
///
/// Returns [`CodecError::TruncatedColumn`] when the record ends inside a
/// length prefix or a payload.
pub fn decode_columns(record: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut columns = Vec::new();
    let mut cursor = 0usize;
    while cursor < record.len() {
        let remaining = record.len() - cursor;
        if remaining < 4 {
            return Err(CodecError::TruncatedColumn {
                at: cursor,
                expected_len: 4,
                remaining,
            });
        }
        let len = u32::from_le_bytes([
            record[cursor],
            record[cursor + 1],
            record[cursor + 2],
            record[cursor + 3],
        ]) as usize;
        cursor += 4;
        let remaining = record.len() - cursor;
        if remaining < len {
            return Err(CodecError::TruncatedColumn {
                at: cursor,
                expected_len: len,
                remaining,
            });
        }
        columns.push(record[cursor..cursor + len].to_vec());
        cursor += len;
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_column_round_trip() {
        let record = encode_columns(&[b"title v2", b"", b"body text"]).unwrap();
        let columns = decode_columns(&record).unwrap();
        assert_eq!(columns, vec![b"title v2".to_vec(), vec![], b"body text".to_vec()]);
    }

    #[test]
    fn empty_record_is_zero_columns() {
        assert_eq!(decode_columns(&[]).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn truncated_prefix_is_rejected() {
        let err = decode_columns(&[5, 0]).unwrap_err();
        assert_eq!(
            err,
            CodecError::TruncatedColumn {
                at: 0,
                expected_len: 4,
                remaining: 2
            }
        );
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut record = encode_columns(&[b"abcdef"]).unwrap();
        record.truncate(record.len() - 2);
        let err = decode_columns(&record).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedColumn { .. }));
    }

    #[test]
    fn single_column_framing_is_not_identity() {
        // Even a single configured column is framed, so the stored
        // record length always exceeds the payload length by the prefix.
        let record = encode_columns(&[b"xyz"]).unwrap();
        assert_eq!(record.len(), 7);
    }
}
