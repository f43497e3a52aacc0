//! Keyframe/delta placement.
//!
//! The planner is a pure function of the group's current maximum
//! sequence number and the relation configuration. It decides where the
//! next entry sits, whether it is a keyframe, and which earlier entry a
//! delta diffs against. The base is always the *farthest* permitted
//! revision (up to the compression depth), not the immediately preceding
//! one: that bounds reconstruction to `ceil((seq - 1) / D)` hops instead
//! of `seq - 1`, trading a wider content delta per diff for a much
//! shorter dependency walk.

use dchain_types::{DeltaTag, RelationConfig, SeqNo};

/// The placement decision for one append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPlan {
    /// Position the new entry will occupy.
    pub new_seq: SeqNo,
    /// Keyframe or delta distance.
    pub tag: DeltaTag,
    /// Base position for a delta; `None` for keyframes.
    pub base_seq: Option<SeqNo>,
}

/// Decide the placement of the next entry in a group.
///
/// `prior_max` is the group's current maximum sequence number (`None`
/// for an empty group). Positions at `(seq - 1) % keyframe_every == 0`
/// are forced keyframes regardless of what the base-distance rule would
/// choose; everything else is a delta at distance
/// `min(compress_depth, seq - 1)`.
#[must_use]
pub fn plan(prior_max: Option<SeqNo>, config: &RelationConfig) -> ChainPlan {
    let new_seq = match prior_max {
        Some(max) => max.next(),
        None => SeqNo::FIRST,
    };
    let seq_raw = new_seq.get();

    if config.forces_keyframe(seq_raw) {
        return ChainPlan {
            new_seq,
            tag: DeltaTag::Keyframe,
            base_seq: None,
        };
    }

    // seq_raw >= 2 here, and compress_depth is below the sentinel, so
    // the distance always fits a valid delta tag.
    let distance = u64::from(config.compress_depth).min(seq_raw - 1) as u16;
    let tag = DeltaTag::Delta(distance);
    ChainPlan {
        new_seq,
        tag,
        base_seq: tag.base_of(new_seq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dchain_types::{RelationId, MAX_COMPRESS_DEPTH};

    fn config(keyframe_every: u32, compress_depth: u16) -> RelationConfig {
        RelationConfig {
            relation: RelationId::new(1),
            group_column: "g".to_owned(),
            order_column: "o".to_owned(),
            delta_columns: vec!["c".to_owned()],
            keyframe_every,
            compress_depth,
        }
    }

    fn seq(n: u64) -> SeqNo {
        SeqNo::new(n).unwrap()
    }

    #[test]
    fn first_entry_is_always_a_keyframe() {
        for (k, d) in [(1, 1), (5, 3), (1000, MAX_COMPRESS_DEPTH)] {
            let p = plan(None, &config(k, d));
            assert_eq!(p.new_seq, SeqNo::FIRST);
            assert_eq!(p.tag, DeltaTag::Keyframe);
            assert_eq!(p.base_seq, None);
        }
    }

    #[test]
    fn depth_five_sixth_entry_reaches_back_to_one() {
        let cfg = config(1000, 5);
        let p = plan(Some(seq(5)), &cfg);
        assert_eq!(p.new_seq, seq(6));
        assert_eq!(p.tag, DeltaTag::Delta(5));
        assert_eq!(p.base_seq, Some(seq(1)));
    }

    #[test]
    fn early_entries_are_clamped_to_the_chain_start() {
        let cfg = config(1000, 8);
        // seq 2 can only reach back 1, seq 3 back 2, and so on.
        for prior in 1..8u64 {
            let p = plan(Some(seq(prior)), &cfg);
            let expect = prior.min(8) as u16;
            assert_eq!(p.tag, DeltaTag::Delta(expect));
            assert_eq!(p.base_seq, Some(seq(prior + 1 - u64::from(expect))));
        }
    }

    #[test]
    fn keyframe_interval_forces_periodic_keyframes() {
        let cfg = config(5, 3);
        let mut keyframes = Vec::new();
        for prior in 0..25u64 {
            let p = plan(SeqNo::new(prior), &cfg);
            if p.tag.is_keyframe() {
                keyframes.push(p.new_seq.get());
            }
        }
        assert_eq!(keyframes, vec![1, 6, 11, 16, 21]);
    }

    #[test]
    fn interval_one_disables_deltas_entirely() {
        let cfg = config(1, 9);
        for prior in 0..40u64 {
            assert!(plan(SeqNo::new(prior), &cfg).tag.is_keyframe());
        }
    }

    #[test]
    fn delta_base_may_cross_a_keyframe_boundary() {
        // K=5, D=10: seq 7 reaches all the way back to seq 1, past the
        // keyframe at 6. Legal: only presence of the base matters.
        let cfg = config(5, 10);
        let p = plan(Some(seq(6)), &cfg);
        assert_eq!(p.tag, DeltaTag::Delta(6));
        assert_eq!(p.base_seq, Some(seq(1)));
    }

    #[test]
    fn max_depth_boundary_tag_is_representable() {
        let cfg = config(u32::MAX, MAX_COMPRESS_DEPTH);
        let prior = u64::from(MAX_COMPRESS_DEPTH);
        let p = plan(Some(seq(prior)), &cfg);
        assert_eq!(p.tag, DeltaTag::Delta(MAX_COMPRESS_DEPTH));
        assert_eq!(p.base_seq, Some(seq(1)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_plan_satisfies_the_placement_invariants(
                prior in 0u64..100_000,
                keyframe_every in 1u32..200,
                compress_depth in 1u16..=MAX_COMPRESS_DEPTH,
            ) {
                let cfg = config(keyframe_every, compress_depth);
                let p = plan(SeqNo::new(prior), &cfg);
                prop_assert_eq!(p.new_seq.get(), prior + 1);
                match p.tag {
                    DeltaTag::Keyframe => {
                        prop_assert!(cfg.forces_keyframe(p.new_seq.get()));
                        prop_assert!(p.base_seq.is_none());
                    }
                    DeltaTag::Delta(d) => {
                        prop_assert!(!cfg.forces_keyframe(p.new_seq.get()));
                        prop_assert!(d >= 1 && d <= compress_depth);
                        prop_assert_eq!(
                            u64::from(d),
                            u64::from(compress_depth).min(p.new_seq.get() - 1)
                        );
                        let base = p.base_seq.unwrap();
                        prop_assert_eq!(base.get(), p.new_seq.get() - u64::from(d));
                        prop_assert!(base.get() >= 1);
                    }
                }
            }
        }
    }
}
