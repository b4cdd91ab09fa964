//! Reopening resources and recovering from torn commit logs.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use trunkdb_testkit::prelude::*;

fn commit_number(resource: &ResourceManager, n: u32) -> Revision {
    let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
    if !wtx.move_to_first_child() {
        wtx.insert_first_child(&NodeContent::array()).unwrap();
    }
    wtx.insert_last_child(&NodeContent::number(f64::from(n)))
        .unwrap();
    let revision = wtx.commit().unwrap();
    wtx.close().unwrap();
    revision
}

#[test]
fn file_resource_survives_reopen() {
    let config = ResourceConfig::default().index(IndexDef::name(1));
    let mut fixture = TestResource::file(config);
    let id = fixture.resource_id();
    for n in 1..=3 {
        commit_number(&fixture, n);
    }
    let hash = fixture.begin_node_read_only_trx().unwrap().hash();

    fixture.reopen();

    assert_eq!(fixture.resource_id(), id);
    assert_eq!(fixture.most_recent_revision(), Revision::new(3));
    let rtx = fixture.begin_node_read_only_trx().unwrap();
    assert_eq!(rtx.hash(), hash);
    assert_eq!(rtx.descendant_count(), 4);

    let old = fixture.begin_node_read_only_trx_at(Revision::new(1)).unwrap();
    assert_eq!(old.descendant_count(), 2);
    assert_eq!(commit_number(&fixture, 4), Revision::new(4));
}

#[test]
fn torn_tail_is_cut_off() {
    let fixture = TestResource::memory(ResourceConfig::default());
    commit_number(&fixture, 1);
    let intact = fixture.memory_backend().bytes();
    commit_number(&fixture, 2);
    let mut full = fixture.memory_backend().bytes();
    full.truncate(full.len() - 5);

    let backend = InMemoryBackend::with_data(full);
    let resource = ResourceManager::open(
        "recovered",
        Arc::new(backend.clone()),
        ResourceConfig::default(),
    )
    .unwrap();

    assert_eq!(resource.most_recent_revision(), Revision::new(1));
    assert_eq!(backend.bytes(), intact);
    assert_eq!(commit_number(&resource, 2), Revision::new(2));
}

#[test]
fn trailing_garbage_in_file_is_discarded() {
    let mut fixture = TestResource::file(ResourceConfig::default());
    commit_number(&fixture, 1);
    let path = fixture.path().unwrap().to_path_buf();
    let len = std::fs::metadata(&path).unwrap().len();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"TRKRnot a record").unwrap();
    file.sync_all().unwrap();
    drop(file);

    fixture.reopen();

    assert_eq!(fixture.most_recent_revision(), Revision::new(1));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
}

#[test]
fn open_rejects_wrong_document_model() {
    let fixture = TestResource::memory(ResourceConfig::default());
    let backend = fixture.memory_backend().clone();

    let err = ResourceManager::open(
        "xml",
        Arc::new(backend),
        ResourceConfig::default().resource_kind(ResourceKind::Xml),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::InvalidFormat { .. }));
}

#[test]
fn create_and_open_check_backend_contents() {
    let fixture = TestResource::memory(ResourceConfig::default());
    let err = ResourceManager::create(
        "again",
        Arc::new(fixture.memory_backend().clone()),
        ResourceConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::ResourceExists { .. }));

    let err = ResourceManager::open(
        "missing",
        Arc::new(InMemoryBackend::new()),
        ResourceConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::ResourceNotFound { .. }));
}

#[test]
fn transaction_ids_continue_after_reopen() {
    let mut fixture = TestResource::memory(ResourceConfig::default());
    commit_number(&fixture, 1);
    let last = fixture.history()[1].trx_id();

    fixture.reopen();
    let mut wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
    assert!(wtx.id() > last);
    wtx.close().unwrap();
}
