//! Crash-restart durability: committed revisions survive with correct
//! content and statistics, uncommitted work vanishes.

use dchain_engine::{ConfigRequest, Engine, WriteTxn};
use dchain_error::ChainError;
use dchain_harness::content::revision_body;
use dchain_harness::MemoryHost;
use dchain_types::{ColumnKind, ColumnSpec, RelationId, Value};

const RELATION: RelationId = RelationId::new(51);

fn configure(engine: &Engine, host: &MemoryHost) {
    let columns = [
        ColumnSpec::new("doc_id", ColumnKind::Integer, false),
        ColumnSpec::new("version", ColumnKind::Integer, false),
        ColumnSpec::new("body", ColumnKind::Bytes, false),
    ];
    let request = ConfigRequest {
        relation: RELATION,
        group_by: "doc_id".to_owned(),
        order_by: "version".to_owned(),
        delta_columns: vec!["body".to_owned()],
        keyframe_every: 4,
        compress_depth: 3,
    };
    let mut txn = host.begin();
    engine.configure(&mut txn, &request, &columns).unwrap();
    txn.commit();
}

#[test]
fn committed_revisions_survive_a_crash_and_uncommitted_do_not() {
    let host = MemoryHost::new();
    let engine = Engine::new();
    configure(&engine, &host);
    let group = Value::Integer(3);

    // Five committed revisions.
    let mut txn = host.begin();
    let mut write = WriteTxn::new(&mut txn);
    for rev in 1..=5u64 {
        let body = revision_body(3, rev, 400);
        engine
            .insert(&mut write, RELATION, &group, &Value::Integer(rev as i64), &[&body])
            .unwrap();
    }
    write.flush_stats().unwrap();
    drop(write);
    txn.commit();

    // A sixth left in flight when the crash hits.
    let mut open_txn = host.begin();
    let mut open = WriteTxn::new(&mut open_txn);
    let body = revision_body(3, 6, 400);
    engine
        .insert(&mut open, RELATION, &group, &Value::Integer(6), &[&body])
        .unwrap();

    let revived = host.restart();
    drop(open);
    drop(open_txn);

    // A fresh engine on the revived host: the configuration must load
    // from persisted state, not from the old registry cache.
    let engine = Engine::new();
    let reader = revived.begin();
    for rev in 1..=5u64 {
        let got = engine
            .read(&reader, RELATION, &group, &Value::Integer(rev as i64))
            .unwrap();
        assert_eq!(got, vec![revision_body(3, rev, 400)], "rev {rev}");
    }
    let err = engine
        .read(&reader, RELATION, &group, &Value::Integer(6))
        .unwrap_err();
    assert!(matches!(err, ChainError::RevisionNotFound { .. }));

    let stats = engine.stats(&reader, RELATION).unwrap();
    assert_eq!(stats.group_count, 1);
    assert_eq!(stats.totals.row_count, 5);
    drop(reader);

    // The cached counters equal the full-scan ground truth.
    let cached = {
        let reader = revived.begin();
        engine.stats(&reader, RELATION).unwrap()
    };
    let mut txn = revived.begin();
    let report = engine.refresh_stats(&mut txn, RELATION).unwrap();
    txn.commit();
    assert_eq!(report.rows_scanned, 5);
    let reader = revived.begin();
    assert_eq!(engine.stats(&reader, RELATION).unwrap(), cached);
}

#[test]
fn uncommitted_delete_leaves_the_chain_intact_after_restart() {
    let host = MemoryHost::new();
    let engine = Engine::new();
    configure(&engine, &host);
    let group = Value::Integer(9);

    let mut txn = host.begin();
    let mut write = WriteTxn::new(&mut txn);
    for rev in 1..=8u64 {
        let body = revision_body(9, rev, 350);
        engine
            .insert(&mut write, RELATION, &group, &Value::Integer(rev as i64), &[&body])
            .unwrap();
    }
    write.flush_stats().unwrap();
    drop(write);
    txn.commit();

    let mut doomed_txn = host.begin();
    let mut doomed = WriteTxn::new(&mut doomed_txn);
    let removed = engine
        .delete(&mut doomed, RELATION, &group, &Value::Integer(3))
        .unwrap();
    assert_eq!(removed, 6);

    let revived = host.restart();
    drop(doomed);
    drop(doomed_txn);

    let engine = Engine::new();
    let reader = revived.begin();
    let entries = engine.inspect(&reader, RELATION, &group).unwrap();
    assert_eq!(entries.len(), 8);
    for rev in 1..=8u64 {
        let got = engine
            .read(&reader, RELATION, &group, &Value::Integer(rev as i64))
            .unwrap();
        assert_eq!(got, vec![revision_body(9, rev, 350)]);
    }
    let stats = engine.stats(&reader, RELATION).unwrap();
    assert_eq!(stats.totals.row_count, 8);
}

#[test]
fn appends_after_recovery_continue_the_committed_chain() {
    let host = MemoryHost::new();
    let engine = Engine::new();
    configure(&engine, &host);
    let group = Value::Integer(5);

    let mut txn = host.begin();
    let mut write = WriteTxn::new(&mut txn);
    for rev in 1..=6u64 {
        let body = revision_body(5, rev, 320);
        engine
            .insert(&mut write, RELATION, &group, &Value::Integer(rev as i64), &[&body])
            .unwrap();
    }
    write.flush_stats().unwrap();
    drop(write);
    txn.commit();

    let revived = host.restart();
    let engine = Engine::new();

    let mut txn = revived.begin();
    let mut write = WriteTxn::new(&mut txn);
    let body = revision_body(5, 7, 320);
    let seq = engine
        .insert(&mut write, RELATION, &group, &Value::Integer(7), &[&body])
        .unwrap();
    assert_eq!(seq.get(), 7);
    write.flush_stats().unwrap();
    drop(write);
    txn.commit();

    let reader = revived.begin();
    for rev in 1..=7u64 {
        let got = engine
            .read(&reader, RELATION, &group, &Value::Integer(rev as i64))
            .unwrap();
        assert_eq!(got, vec![revision_body(5, rev, 320)]);
    }
}
