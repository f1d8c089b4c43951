//! Integration tests for the snippet store.
//!
//! Each test gets a fresh store; durability tests run against a temp
//! directory and reopen the database file.

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use codepad_store::{Snippet, SnippetStore, StoreError, DEFAULT_ID, DEFAULT_NAME};

fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

fn t2() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap()
}

fn t3() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap()
}

fn store() -> SnippetStore {
    SnippetStore::in_memory().expect("in-memory store opens")
}

#[test]
fn seeds_default_snippet() {
    let store = store();
    let s = store.retrieve(DEFAULT_ID).unwrap();
    assert_eq!(s.id, DEFAULT_ID);
    assert_eq!(s.name, DEFAULT_NAME);
    assert!(s.code.contains("package main"));
    assert!(s.created.is_some());
    assert!(s.modified.is_some());
}

#[test]
fn create_assigns_increasing_ids_and_timestamps() {
    let mut store = store();
    store.set_clock(t1);

    let a = store.create(&Snippet::new("a", "code a")).unwrap();
    let b = store.create(&Snippet::new("b", "")).unwrap();
    assert_eq!(a.id, DEFAULT_ID + 1);
    assert_eq!(b.id, DEFAULT_ID + 2);
    assert_eq!(a.created, a.modified);
    assert_eq!(a.created.unwrap(), t1());

    let got = store.retrieve(a.id).unwrap();
    assert_eq!(got, a);
}

#[test]
fn create_rejections() {
    let store = store();
    assert!(matches!(
        store.create(&Snippet::new("", "code")),
        Err(StoreError::BadRequest(_))
    ));

    let mut preset = Snippet::new("x", "");
    preset.id = 42;
    assert!(matches!(
        store.create(&preset),
        Err(StoreError::BadRequest(_))
    ));
}

#[test]
fn ids_are_never_reused() {
    let store = store();
    let a = store.create(&Snippet::new("a", "")).unwrap(); // id 2
    let b = store.create(&Snippet::new("b", "")).unwrap(); // id 3
    store.delete(b.id).unwrap();
    let c = store.create(&Snippet::new("c", "")).unwrap(); // id 4, not 3
    assert_eq!(c.id, b.id + 1);

    let ids: Vec<i64> = store
        .query_by_id(DEFAULT_ID, 100)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![a.id, c.id]);
}

#[test]
fn update_overlays_and_advances_modified() {
    let mut store = store();
    store.set_clock(t1);
    let s = store.create(&Snippet::new("original", "original code")).unwrap();

    store.set_clock(t2);
    store.update(&Snippet::new("renamed", ""), s.id).unwrap();

    let got = store.retrieve(s.id).unwrap();
    assert_eq!(got.name, "renamed");
    assert_eq!(got.code, "original code", "empty code leaves code alone");
    assert_eq!(got.created.unwrap(), t1(), "created never changes");
    assert_eq!(got.modified.unwrap(), t2());

    store.set_clock(t3);
    store.update(&Snippet::new("", "new code"), s.id).unwrap();
    let got = store.retrieve(s.id).unwrap();
    assert_eq!(got.name, "renamed", "empty name leaves name alone");
    assert_eq!(got.code, "new code");
    assert_eq!(got.modified.unwrap(), t3());
}

#[test]
fn update_rejections() {
    let store = store();
    let s = store.create(&Snippet::new("victim", "code")).unwrap();

    assert!(matches!(
        store.update(&Snippet::new("x", ""), 0),
        Err(StoreError::BadRequest(_))
    ));

    let mut mismatched = Snippet::new("x", "");
    mismatched.id = s.id + 10;
    assert!(matches!(
        store.update(&mismatched, s.id),
        Err(StoreError::BadRequest(_))
    ));

    assert!(matches!(
        store.update(&Snippet::new("new default name", ""), DEFAULT_ID),
        Err(StoreError::BadRequest(_))
    ));
    // Re-asserting the existing name is allowed.
    store
        .update(&Snippet::new(DEFAULT_NAME, "tweaked"), DEFAULT_ID)
        .unwrap();

    let mut stamped = Snippet::new("x", "");
    stamped.modified = Some(Utc::now());
    assert!(matches!(
        store.update(&stamped, s.id),
        Err(StoreError::BadRequest(_))
    ));

    assert!(matches!(
        store.update(&Snippet::new("x", ""), s.id + 99),
        Err(StoreError::NotFound)
    ));
}

#[test]
fn delete_guards() {
    let store = store();
    assert!(matches!(
        store.delete(DEFAULT_ID),
        Err(StoreError::BadRequest(_))
    ));
    assert!(matches!(store.delete(0), Err(StoreError::BadRequest(_))));
    assert!(matches!(store.delete(999), Err(StoreError::NotFound)));

    let s = store.create(&Snippet::new("doomed", "")).unwrap();
    store.delete(s.id).unwrap();
    assert!(matches!(store.retrieve(s.id), Err(StoreError::NotFound)));
}

#[test]
fn query_by_id_pages_in_ascending_order() {
    let store = store();
    for name in ["a", "b", "c", "d"] {
        store.create(&Snippet::new(name, "")).unwrap();
    }

    let all = store.query_by_id(0, -1).unwrap();
    let ids: Vec<i64> = all.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let page = store.query_by_id(2, 2).unwrap();
    let ids: Vec<i64> = page.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![3, 4]);

    assert!(store.query_by_id(5, 100).unwrap().is_empty());
    assert!(store.query_by_id(0, 0).unwrap().is_empty());
}

#[test]
fn query_by_modified_orders_and_pages() {
    let mut store = store();
    store.set_clock(t1);
    let a = store.create(&Snippet::new("a", "")).unwrap();
    store.set_clock(t2);
    let b = store.create(&Snippet::new("b", "")).unwrap();
    let c = store.create(&Snippet::new("c", "")).unwrap(); // same instant as b
    store.set_clock(t3);
    store.update(&Snippet::new("", "touched"), a.id).unwrap();

    // Newest first: a (t3), then c and b (t2, id descending), then the
    // default snippet (epoch).
    let all = store.query_by_modified(None, 0, -1).unwrap();
    let ids: Vec<i64> = all.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![a.id, c.id, b.id, DEFAULT_ID]);

    // Cursor paging resumes without overlap or gap.
    let first = store.query_by_modified(None, 0, 2).unwrap();
    let last = first.last().unwrap();
    let rest = store
        .query_by_modified(last.modified, last.id, 2)
        .unwrap();
    let mut ids: Vec<i64> = first.iter().map(|s| s.id).collect();
    ids.extend(rest.iter().map(|s| s.id));
    assert_eq!(ids, vec![a.id, c.id, b.id, DEFAULT_ID]);
}

#[test]
fn explicit_epoch_cursor_is_not_a_wildcard() {
    let store = store();
    store.create(&Snippet::new("recent", "")).unwrap();

    // Without a cursor, everything comes back, newest first.
    assert_eq!(store.query_by_modified(None, 0, -1).unwrap().len(), 2);

    // An explicit epoch cursor asks for records strictly older than the
    // epoch; not even the epoch-stamped default snippet qualifies.
    let epoch = DateTime::from_timestamp_nanos(0);
    assert!(store
        .query_by_modified(Some(epoch), 0, -1)
        .unwrap()
        .is_empty());
}

#[test]
fn query_by_name_ranks_matches() {
    let store = store();
    store.create(&Snippet::new("alpha beta", "")).unwrap(); // id 2
    store.create(&Snippet::new("beta beta", "")).unwrap(); // id 3
    store.create(&Snippet::new("gamma", "")).unwrap(); // id 4
    store.create(&Snippet::new("Beta", "")).unwrap(); // id 5

    let hits = store.query_by_name("beta", -1).unwrap();
    let names: Vec<&str> = hits.iter().map(|s| s.name.as_str()).collect();
    // Two occurrences first, then single occurrences by ascending name.
    assert_eq!(names, vec!["beta beta", "alpha beta", "Beta"]);

    let hits = store.query_by_name("alpha gamma", -1).unwrap();
    let names: Vec<&str> = hits.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alpha beta", "gamma"]);

    // Case-insensitive matching.
    let hits = store.query_by_name("BETA", -1).unwrap();
    assert_eq!(hits.len(), 3);

    // The empty query matches everything, longer names scoring higher.
    let hits = store.query_by_name("", -1).unwrap();
    assert_eq!(hits.len(), 5);

    // Limits trim the ranked list.
    let hits = store.query_by_name("beta", 1).unwrap();
    assert_eq!(hits[0].name, "beta beta");
    assert_eq!(hits.len(), 1);

    assert!(store.query_by_name("zeta", -1).unwrap().is_empty());
}

#[test]
fn identical_names_are_ordered_by_descending_id() {
    let store = store();
    let a = store.create(&Snippet::new("twin", "")).unwrap();
    let b = store.create(&Snippet::new("twin", "")).unwrap();
    let hits = store.query_by_name("twin", -1).unwrap();
    let ids: Vec<i64> = hits.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[test]
fn effects_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let (kept_id, deleted_id) = {
        let mut store = SnippetStore::open(dir.path()).unwrap();
        store.set_clock(t1);
        let doomed = store.create(&Snippet::new("doomed", "")).unwrap();
        let kept = store.create(&Snippet::new("kept", "body")).unwrap();
        store.delete(doomed.id).unwrap();
        store
            .update(&Snippet::new("kept renamed", ""), kept.id)
            .unwrap();
        (kept.id, doomed.id)
    };

    let store = SnippetStore::open(dir.path()).unwrap();
    let all = store.query_by_id(0, -1).unwrap();
    let ids: Vec<i64> = all.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![DEFAULT_ID, kept_id]);

    let kept = store.retrieve(kept_id).unwrap();
    assert_eq!(kept.name, "kept renamed");
    assert_eq!(kept.code, "body");
    assert!(matches!(store.retrieve(deleted_id), Err(StoreError::NotFound)));

    // The id counter resumes past every id ever used.
    let next = store.create(&Snippet::new("new", "")).unwrap();
    assert!(next.id > deleted_id);

    // The name cache was rebuilt from disk.
    let hits = store.query_by_name("renamed", -1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, kept_id);
}
