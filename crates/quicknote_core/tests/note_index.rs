use quicknote_core::db::{open_db, open_db_in_memory};
use quicknote_core::{
    KvNoteRepository, KvStore, MemoryKvStore, Note, NoteDraft, NoteRepository, ReadFailure,
    RepoError, SqliteKvStore,
};
use std::collections::BTreeSet;
use std::sync::Barrier;
use std::thread;

fn fixed_clock() -> i64 {
    1_700_000_000_000
}

fn stored_index(store: &impl KvStore) -> Vec<String> {
    match store.get("notesIndex").unwrap() {
        Some(raw) => serde_json::from_str(&raw).unwrap(),
        None => Vec::new(),
    }
}

fn put_note(store: &impl KvStore, id: &str, title: &str) {
    let note = Note {
        id: id.to_string(),
        title: title.to_string(),
        content: format!("{title} body"),
        date: "2024/1/1 00:00:00".to_string(),
    };
    store
        .put(&format!("note:{id}"), &serde_json::to_string(&note).unwrap())
        .unwrap();
}

#[test]
fn upsert_on_empty_store_assigns_timestamp_id_and_lists_it() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::with_clock(&store, fixed_clock);

    let mut draft = NoteDraft::new("A", "B");
    draft.date = "2023/11/15 06:13:20".to_string();
    let saved = repo.upsert(draft).unwrap();
    assert_eq!(saved.id, "1700000000000");

    let page = repo.list_page(1, 10).unwrap();
    assert_eq!(page.notes, vec![saved]);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.page, 1);
}

#[test]
fn upsert_with_existing_id_replaces_record_and_keeps_index() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);
    let first = repo.upsert(NoteDraft::new("first", "one")).unwrap();
    let second = repo.upsert(NoteDraft::new("second", "two")).unwrap();

    let updated = repo
        .upsert(NoteDraft::with_id(first.id.clone(), "first v2", "one v2"))
        .unwrap();

    assert_eq!(stored_index(&store), vec![first.id.clone(), second.id.clone()]);
    let page = repo.list_page(1, 10).unwrap();
    assert_eq!(page.notes[0], updated);
    assert_eq!(page.notes[0].title, "first v2");
    assert_eq!(page.notes[1].id, second.id);
}

#[test]
fn upsert_with_unknown_id_appends_it_once() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);

    repo.upsert(NoteDraft::with_id("legacy-7", "t", "c")).unwrap();
    repo.upsert(NoteDraft::with_id("legacy-7", "t2", "c2")).unwrap();

    assert_eq!(stored_index(&store), vec!["legacy-7".to_string()]);
}

#[test]
fn delete_removes_record_and_index_entry_and_is_idempotent() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);
    let keep = repo.upsert(NoteDraft::with_id("1", "keep", "x")).unwrap();
    let gone = repo.upsert(NoteDraft::with_id("2", "gone", "y")).unwrap();

    repo.delete(&gone.id).unwrap();
    repo.delete(&gone.id).unwrap();
    repo.delete("never-existed").unwrap();

    assert_eq!(store.get("note:2").unwrap(), None);
    assert_eq!(stored_index(&store), vec![keep.id.clone()]);
    let page = repo.list_page(1, 10).unwrap();
    assert!(page.notes.iter().all(|note| note.id != gone.id));
}

#[test]
fn list_page_drops_stale_entries_and_persists_corrected_index() {
    let store = MemoryKvStore::new();
    put_note(&store, "1", "one");
    put_note(&store, "3", "three");
    store.put("notesIndex", r#"["1","2","3"]"#).unwrap();
    let repo = KvNoteRepository::new(&store);

    let page = repo.list_page(1, 10).unwrap();

    let ids: Vec<&str> = page.notes.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(page.total_pages, 1);
    assert_eq!(stored_index(&store), vec!["1".to_string(), "3".to_string()]);
}

#[test]
fn list_page_collapses_duplicate_index_entries() {
    let store = MemoryKvStore::new();
    put_note(&store, "1", "one");
    store.put("notesIndex", r#"["1","1"]"#).unwrap();
    let repo = KvNoteRepository::new(&store);

    let page = repo.list_page(1, 10).unwrap();
    assert_eq!(page.notes.len(), 1);
    assert_eq!(stored_index(&store), vec!["1".to_string()]);
}

#[test]
fn list_page_succeeds_when_index_correction_cannot_be_written() {
    let store = MemoryKvStore::new();
    put_note(&store, "1", "one");
    store.put("notesIndex", r#"["1","ghost"]"#).unwrap();
    store.fail_writes_of("notesIndex");
    let repo = KvNoteRepository::new(&store);

    let page = repo.list_page(1, 10).unwrap();
    assert_eq!(page.notes.len(), 1);
    assert_eq!(page.total_pages, 1);
    assert_eq!(
        stored_index(&store),
        vec!["1".to_string(), "ghost".to_string()]
    );
}

#[test]
fn list_page_adopts_orphan_records_and_persists_index() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);
    repo.upsert(NoteDraft::with_id("1", "one", "c")).unwrap();

    store.fail_writes_of("notesIndex");
    repo.upsert(NoteDraft::with_id("7", "seven", "c")).unwrap_err();
    store.clear_faults();
    put_note(&store, "10", "ten");
    assert_eq!(stored_index(&store), vec!["1".to_string()]);

    let page = repo.list_page(1, 10).unwrap();
    let ids: Vec<&str> = page.notes.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "7", "10"]);
    assert_eq!(page.notes[1].title, "seven");
    assert_eq!(page.total_pages, 1);
    assert_eq!(
        stored_index(&store),
        vec!["1".to_string(), "7".to_string(), "10".to_string()]
    );
}

#[test]
fn list_page_still_serves_indexed_notes_when_orphan_is_malformed() {
    let store = MemoryKvStore::new();
    put_note(&store, "1", "one");
    store.put("notesIndex", r#"["1"]"#).unwrap();
    store.put("note:2", "{not json").unwrap();
    let repo = KvNoteRepository::new(&store);

    let page = repo.list_page(1, 10).unwrap();
    assert_eq!(page.notes.len(), 1);
    assert_eq!(stored_index(&store), vec!["1".to_string()]);
    assert!(repo.reconcile().is_err());
}

#[test]
fn list_page_slices_in_index_order_and_reports_total_pages() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);
    for idx in 0..7 {
        repo.upsert(NoteDraft::with_id(format!("{idx}"), format!("n{idx}"), "c"))
            .unwrap();
    }

    let second = repo.list_page(2, 3).unwrap();
    let ids: Vec<&str> = second.notes.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "4", "5"]);
    assert_eq!(second.total_pages, 3);

    let last = repo.list_page(3, 3).unwrap();
    assert_eq!(last.notes.len(), 1);

    let beyond = repo.list_page(9, 3).unwrap();
    assert!(beyond.notes.is_empty());
    assert_eq!(beyond.total_pages, 3);
    assert_eq!(beyond.page, 9);
}

#[test]
fn list_page_on_empty_store_has_zero_pages() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::new(&store);

    let page = repo.list_page(1, 10).unwrap();
    assert!(page.notes.is_empty());
    assert_eq!(page.total_pages, 0);
    assert!(store.is_empty());
}

#[test]
fn malformed_record_is_a_read_failure() {
    let store = MemoryKvStore::new();
    store.put("note:1", "{not json").unwrap();
    store.put("notesIndex", r#"["1"]"#).unwrap();
    let repo = KvNoteRepository::new(&store);

    let err = repo.list_page(1, 10).unwrap_err();
    match err {
        RepoError::StorageRead { key, cause } => {
            assert_eq!(key, "note:1");
            assert!(matches!(cause, ReadFailure::Malformed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_index_write_surfaces_and_next_reconcile_adopts_orphan() {
    let store = MemoryKvStore::new();
    let repo = KvNoteRepository::with_clock(&store, fixed_clock);
    repo.upsert(NoteDraft::with_id("1", "one", "c")).unwrap();

    store.fail_writes_of("notesIndex");
    let err = repo.upsert(NoteDraft::new("orphan", "c")).unwrap_err();
    assert!(matches!(err, RepoError::StorageWrite { .. }));
    assert!(store.get("note:1700000000000").unwrap().is_some());
    assert_eq!(stored_index(&store), vec!["1".to_string()]);

    store.clear_faults();
    let report = repo.reconcile().unwrap();
    assert_eq!(report.kept, 1);
    assert!(report.dropped.is_empty());
    assert_eq!(report.adopted, vec!["1700000000000".to_string()]);
    assert_eq!(
        stored_index(&store),
        vec!["1".to_string(), "1700000000000".to_string()]
    );
}

#[test]
fn reconcile_orders_adopted_ids_numerically() {
    let store = MemoryKvStore::new();
    put_note(&store, "10", "ten");
    put_note(&store, "9", "nine");
    store.put("notesIndex", r#"["gone"]"#).unwrap();
    let repo = KvNoteRepository::new(&store);

    let report = repo.reconcile().unwrap();
    assert_eq!(report.dropped, vec!["gone".to_string()]);
    assert_eq!(report.adopted, vec!["9".to_string(), "10".to_string()]);
    assert!(report.changed());

    let again = repo.reconcile().unwrap();
    assert!(!again.changed());
    assert_eq!(again.kept, 2);
}

#[test]
fn index_matches_records_after_mixed_operations_on_sqlite() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteKvStore::try_new(&conn).unwrap();
    let repo = KvNoteRepository::new(&store);

    for idx in 0..12u32 {
        let id = format!("{}", idx % 5);
        if idx % 3 == 2 {
            repo.delete(&id).unwrap();
        } else {
            repo.upsert(NoteDraft::with_id(id, format!("t{idx}"), "c"))
                .unwrap();
        }

        repo.list_page(1, 50).unwrap();
        let indexed: BTreeSet<String> = stored_index(&store).into_iter().collect();
        let recorded: BTreeSet<String> = store
            .keys_with_prefix("note:")
            .unwrap()
            .into_iter()
            .map(|key| key.trim_start_matches("note:").to_string())
            .collect();
        assert_eq!(indexed, recorded, "mismatch after step {idx}");
    }
}

#[test]
fn sqlite_batch_keeps_record_and_index_together() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_index BEFORE INSERT ON kv_entries
         WHEN NEW.key = 'notesIndex'
         BEGIN SELECT RAISE(ABORT, 'index locked'); END;",
    )
    .unwrap();
    let store = SqliteKvStore::try_new(&conn).unwrap();
    let repo = KvNoteRepository::with_clock(&store, fixed_clock);

    let err = repo.upsert(NoteDraft::new("t", "c")).unwrap_err();
    assert!(matches!(err, RepoError::StorageWrite { .. }));
    assert_eq!(store.get("note:1700000000000").unwrap(), None);
}

#[test]
fn concurrent_upserts_on_separate_connections_keep_every_id_indexed() {
    const WRITERS: usize = 4;
    const ROUNDS: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("notes.sqlite3");
    drop(open_db(&db_path).unwrap());
    let barrier = Barrier::new(WRITERS);

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let (barrier, db_path) = (&barrier, &db_path);
            scope.spawn(move || {
                let conn = open_db(db_path).unwrap();
                let store = SqliteKvStore::try_new(&conn).unwrap();
                let repo = KvNoteRepository::new(&store);
                for round in 0..ROUNDS {
                    barrier.wait();
                    repo.upsert(NoteDraft::with_id(format!("{writer}-{round}"), "t", "c"))
                        .unwrap();
                }
            });
        }
    });

    let conn = open_db(&db_path).unwrap();
    let store = SqliteKvStore::try_new(&conn).unwrap();
    let recorded: BTreeSet<String> = store
        .keys_with_prefix("note:")
        .unwrap()
        .into_iter()
        .map(|key| key.trim_start_matches("note:").to_string())
        .collect();
    let indexed = stored_index(&store);
    assert_eq!(recorded.len(), WRITERS * ROUNDS);
    assert_eq!(indexed.len(), WRITERS * ROUNDS);
    assert_eq!(indexed.into_iter().collect::<BTreeSet<_>>(), recorded);

    let repo = KvNoteRepository::new(&store);
    let page = repo.list_page(1, 1).unwrap();
    assert_eq!(page.total_pages as usize, WRITERS * ROUNDS);
}

#[test]
fn concurrent_deletes_and_upserts_leave_index_equal_to_records() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("notes.sqlite3");
    {
        let conn = open_db(&db_path).unwrap();
        let store = SqliteKvStore::try_new(&conn).unwrap();
        let repo = KvNoteRepository::new(&store);
        for idx in 0..20 {
            repo.upsert(NoteDraft::with_id(format!("old-{idx}"), "t", "c"))
                .unwrap();
        }
    }
    let barrier = Barrier::new(2);

    thread::scope(|scope| {
        let (barrier, db_path) = (&barrier, &db_path);
        scope.spawn(move || {
            let conn = open_db(db_path).unwrap();
            let store = SqliteKvStore::try_new(&conn).unwrap();
            let repo = KvNoteRepository::new(&store);
            for idx in 0..20 {
                barrier.wait();
                repo.delete(&format!("old-{idx}")).unwrap();
            }
        });
        scope.spawn(move || {
            let conn = open_db(db_path).unwrap();
            let store = SqliteKvStore::try_new(&conn).unwrap();
            let repo = KvNoteRepository::new(&store);
            for idx in 0..20 {
                barrier.wait();
                repo.upsert(NoteDraft::with_id(format!("new-{idx}"), "t", "c"))
                    .unwrap();
            }
        });
    });

    let conn = open_db(&db_path).unwrap();
    let store = SqliteKvStore::try_new(&conn).unwrap();
    let indexed = stored_index(&store);
    let expected: Vec<String> = (0..20).map(|idx| format!("new-{idx}")).collect();
    assert_eq!(indexed, expected);
    assert_eq!(store.keys_with_prefix("note:old-").unwrap(), Vec::<String>::new());
}
