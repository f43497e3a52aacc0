//! Group lock-id derivation.
//!
//! Writers serialize per group, never per relation: two transactions
//! touching distinct groups must not contend. The token handed to the
//! host's advisory-lock primitive is derived from a 128-bit content
//! fingerprint of the group key so that collisions between distinct
//! `(relation, group)` pairs occur only with cryptographic probability.
//! A collision is not a correctness hazard (it over-serializes), but it
//! is a severe performance regression, which is why the derivation is
//! also verified empirically in tests rather than only by construction.

use sha2::{Digest, Sha256};

use dchain_types::{LockId, RelationId, Value};

/// Domain-separation prefix for the group fingerprint.
const LOCK_DOMAIN: &[u8] = b"dchain:group-lock:v1";

/// Derive the advisory lock id for one `(relation, group)` pair.
///
/// The group key is normalized to its canonical byte encoding first, so
/// hosts that surface the same logical key through different physical
/// paths still derive the same token. The 128-bit SHA-256 prefix is
/// split into little-endian halves `h1, h2` and folded with the relation
/// identity as `h1 ^ relation ^ h2`.
#[must_use]
pub fn derive(relation: RelationId, group: &Value) -> LockId {
    let mut hasher = Sha256::new();
    hasher.update(LOCK_DOMAIN);
    hasher.update(group.to_canonical_bytes());
    let digest = hasher.finalize();

    let mut h1 = [0u8; 8];
    let mut h2 = [0u8; 8];
    h1.copy_from_slice(&digest[0..8]);
    h2.copy_from_slice(&digest[8..16]);

    LockId::new(u64::from_le_bytes(h1) ^ relation.get() ^ u64::from_le_bytes(h2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn derivation_is_deterministic() {
        let rel = RelationId::new(42);
        let group = Value::Text("device-7".to_owned());
        assert_eq!(derive(rel, &group), derive(rel, &group));
    }

    #[test]
    fn distinct_relations_distinct_ids() {
        let group = Value::Integer(1);
        assert_ne!(
            derive(RelationId::new(1), &group),
            derive(RelationId::new(2), &group)
        );
    }

    #[test]
    fn adversarially_similar_keys_do_not_collide() {
        let rel = RelationId::new(9);
        let keys = [
            Value::Integer(1),
            Value::Text("1".to_owned()),
            Value::Bytes(b"1".to_vec()),
            Value::Text("10".to_owned()),
            Value::Integer(10),
            Value::Text(String::new()),
            Value::Bytes(Vec::new()),
            Value::Integer(0),
            Value::Integer(-1),
        ];
        let ids: HashSet<u64> = keys.iter().map(|k| derive(rel, k).get()).collect();
        assert_eq!(ids.len(), keys.len());
    }

    #[test]
    fn empirical_collision_sweep() {
        // The halves-fold must not degenerate for realistic key shapes:
        // sequential integers, short strings, and shared-prefix strings.
        let rel = RelationId::new(123_456);
        let mut seen = HashSet::new();
        let mut count = 0usize;

        for i in 0..4000i64 {
            assert!(seen.insert(derive(rel, &Value::Integer(i)).get()));
            count += 1;
        }
        for i in 0..4000u32 {
            let key = Value::Text(format!("tenant-{i:06}"));
            assert!(seen.insert(derive(rel, &key).get()), "collision at {key}");
            count += 1;
        }

        let mut rng = StdRng::seed_from_u64(0x1bad_5eed);
        for i in 0..4000u32 {
            // Index prefix keeps the keys distinct; the random tail
            // varies length and content.
            let len = rng.gen_range(0..20);
            let mut bytes = i.to_le_bytes().to_vec();
            bytes.extend((0..len).map(|_| rng.gen::<u8>()));
            assert!(seen.insert(derive(rel, &Value::Bytes(bytes)).get()));
            count += 1;
        }

        // No two of the 12k derived ids may coincide, and none may be
        // the degenerate zero value.
        assert_eq!(count, 12_000);
        assert!(!seen.contains(&0));
    }
}
