//! Single-writer, reader isolation and index cache tests under threads.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use trunkdb_testkit::prelude::*;

#[test]
fn at_most_one_writer_at_a_time() {
    init_test_tracing();
    let fixture = TestResource::memory(ResourceConfig::default());
    let config = StressConfig {
        threads: 6,
        operations_per_thread: 10,
    };

    let report = writer_contention(&fixture, &config);
    report.result.print_summary("writer contention");

    assert_eq!(report.max_concurrent_writers, 1);
    assert_eq!(report.result.failed_ops, 0);
    assert_eq!(report.result.successful_ops, 60);
    assert_eq!(fixture.most_recent_revision(), Revision::new(60));
    assert!(!fixture.has_running_node_trx());
}

#[test]
fn second_writer_times_out() {
    let fixture = TestResource::memory(
        ResourceConfig::default().write_lock_timeout(Duration::from_millis(50)),
    );
    let wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
    assert_eq!(fixture.node_trx_id(), Some(wtx.id()));

    let resource = fixture.resource().clone();
    let err = thread::spawn(move || resource.begin_node_trx(CommitPolicy::new()).unwrap_err())
        .join()
        .unwrap();
    match err {
        CoreError::LockTimeout { resource, waited } => {
            assert_eq!(resource, "fixture");
            assert_eq!(waited, Duration::from_millis(50));
        }
        other => panic!("expected LockTimeout, got {other:?}"),
    }

    drop(wtx);
    let mut next = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
    next.close().unwrap();
}

#[test]
fn blocked_writer_proceeds_after_close() {
    let fixture = TestResource::memory(ResourceConfig::default());
    let mut first = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
    first.insert_first_child(&NodeContent::array()).unwrap();

    let resource = fixture.resource().clone();
    let waiter = thread::spawn(move || {
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        let revision = wtx.revision_number();
        wtx.close().unwrap();
        revision
    });

    thread::sleep(Duration::from_millis(30));
    first.commit().unwrap();
    first.close().unwrap();

    // The waiter works on the revision after the one just committed.
    assert_eq!(waiter.join().unwrap(), Revision::new(2));
}

#[test]
fn readers_see_stable_snapshots_while_writer_commits() {
    let fixture = TestResource::memory(ResourceConfig::default());
    let config = StressConfig {
        threads: 4,
        operations_per_thread: 40,
    };

    let result = readers_during_writes(&fixture, &config);
    result.print_summary("readers during writes");

    assert_eq!(result.failed_ops, 0);
    assert_eq!(fixture.most_recent_revision(), Revision::new(40));
    assert_eq!(fixture.stats().open_read_trxs(), 0);
}

#[test]
fn reader_keeps_its_revision_after_later_commits() {
    let fixture = TestResource::memory(ResourceConfig::default());
    let mut wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
    wtx.insert_first_child(&NodeContent::object()).unwrap();
    wtx.insert_first_child(&NodeContent::object_key("title")).unwrap();
    wtx.insert_first_child(&NodeContent::string("Dune")).unwrap();
    wtx.commit().unwrap();

    let mut rtx = fixture.begin_node_read_only_trx().unwrap();
    let hash = rtx.hash();

    let value_key = wtx.node_key();
    wtx.set_value("Emma").unwrap();
    wtx.commit().unwrap();

    assert_eq!(rtx.revision_number(), Revision::new(1));
    assert_eq!(rtx.hash(), hash);
    assert!(rtx.move_to(value_key));
    assert_eq!(rtx.value(), Some("Dune"));

    let latest = fixture.begin_node_read_only_trx().unwrap();
    assert_eq!(latest.node(value_key).unwrap().value(), Some("Emma"));
    wtx.close().unwrap();
}

#[test]
fn index_controller_is_built_once_per_revision_and_mode() {
    let fixture = TestResource::memory(
        ResourceConfig::default()
            .index(IndexDef::name(1))
            .index(IndexDef::path(2)),
    );
    let before = fixture.stats().index_controllers_constructed();

    let readers = concurrent_lookups(&fixture, Revision::ZERO, IndexMode::Read);
    for controller in &readers[1..] {
        assert!(Arc::ptr_eq(&readers[0], controller));
    }
    assert_eq!(fixture.stats().index_controllers_constructed(), before + 1);

    let writers = concurrent_lookups(&fixture, Revision::new(1), IndexMode::Write);
    for controller in &writers[1..] {
        assert!(Arc::ptr_eq(&writers[0], controller));
    }
    assert!(!Arc::ptr_eq(&readers[0], &writers[0]));
    assert_eq!(writers[0].mode(), IndexMode::Write);
    assert_eq!(fixture.stats().index_controllers_constructed(), before + 2);

    let err = fixture
        .index_controller(Revision::new(1), IndexMode::Read)
        .unwrap_err();
    assert!(matches!(err, CoreError::RevisionNotFound { .. }));
}

fn concurrent_lookups(
    resource: &ResourceManager,
    revision: Revision,
    mode: IndexMode,
) -> Vec<Arc<trunkdb_core::IndexController>> {
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let resource = resource.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                resource.index_controller(revision, mode).unwrap()
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}
