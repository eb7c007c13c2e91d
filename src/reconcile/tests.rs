use super::*;
use crate::db::create_tables;
use crate::{links, messages, threads};
use rusqlite::{params, Connection};

fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database should open");
    create_tables(&conn).expect("schema should apply");
    conn
}

fn draft(url: &str, author: &str, title: &str) -> MessageDraft {
    MessageDraft {
        url: url.to_string(),
        author: author.to_string(),
        title: title.to_string(),
        summary: None,
        dt_created: None,
    }
}

fn message_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .expect("count should be readable")
}

fn thread_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))
        .expect("count should be readable")
}

fn resolve(conn: &mut Connection, draft: &MessageDraft) -> Result<i64, StoreError> {
    let tx = conn.transaction().expect("transaction should open");
    let id = resolve_in_tx(&tx, draft)?;
    tx.commit().expect("commit should work");
    Ok(id)
}

#[test]
fn resolving_the_same_url_twice_updates_instead_of_inserting() {
    let mut conn = test_conn();
    let first = resolve(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("resolution should work");
    let stored = messages::find_by_id(&conn, first)
        .expect("lookup should work")
        .expect("message should exist");
    let original_created = stored.dt_created.clone();

    let mut refreshed = draft("gemini://a/x", "~alice-renamed", "Retitled");
    // A caller-supplied creation time is discarded for an existing message.
    refreshed.dt_created = Some("1999-01-01 00:00:00Z".to_string());
    let second = resolve(&mut conn, &refreshed).expect("resolution should work");

    assert_eq!(first, second);
    assert_eq!(message_count(&conn), 1);
    let stored = messages::find_by_id(&conn, first)
        .expect("lookup should work")
        .expect("message should exist");
    assert_eq!(stored.author, "~alice-renamed");
    assert_eq!(stored.title, "Retitled");
    assert_eq!(stored.dt_created, original_created);
}

#[test]
fn resolution_never_adopts_a_message_that_differs_by_a_wildcard_character() {
    let mut conn = test_conn();
    resolve(&mut conn, &draft("gemini://a/xay", "~alice", "First"))
        .expect("resolution should work");
    resolve(&mut conn, &draft("gemini://a/xby", "~bob", "Second"))
        .expect("resolution should work");

    // `_` matches any character under LIKE; identity resolution must not.
    let id = resolve(&mut conn, &draft("gemini://a/x_y", "~carol", "Third"))
        .expect("resolution should work");
    assert_eq!(message_count(&conn), 3);

    let stored = messages::find_by_id(&conn, id)
        .expect("lookup should work")
        .expect("message should exist");
    assert_eq!(stored.url, "gemini://a/x_y");
    assert_eq!(stored.author, "~carol");

    let untouched = messages::find_existing_by_url(&conn, "gemini://a/xay")
        .expect("lookup should work")
        .expect("message should exist");
    assert_eq!(untouched.author, "~alice");
}

#[test]
fn resolving_a_new_url_honors_a_supplied_creation_time() {
    let mut conn = test_conn();
    let mut dated = draft("gemini://a/x", "~alice", "First");
    dated.dt_created = Some("2021-06-01 12:00:00Z".to_string());
    let id = resolve(&mut conn, &dated).expect("resolution should work");

    let stored = messages::find_by_id(&conn, id)
        .expect("lookup should work")
        .expect("message should exist");
    assert_eq!(stored.dt_created, "2021-06-01 12:00:00Z");
}

#[test]
fn create_thread_links_the_origination_and_starts_unanswered() {
    let mut conn = test_conn();
    let thread_id = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");
    assert_eq!(thread_id, 1);

    let thread = threads::find_by_id(&conn, thread_id)
        .expect("lookup should work")
        .expect("thread should exist");
    assert_eq!(thread.author, "~alice");
    assert_eq!(thread.title, "First");
    assert_eq!(thread.dt_updated, "");

    let origin = messages::find_existing_by_url(&conn, "gemini://a/x")
        .expect("lookup should work")
        .expect("message should exist");
    let originated = threads::find_by_originating_message(&conn, origin.id)
        .expect("lookup should work")
        .expect("origination should exist");
    assert_eq!(originated.id, thread_id);
}

#[test]
fn create_thread_for_an_already_originating_url_aborts_with_the_existing_id() {
    let mut conn = test_conn();
    let existing = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");

    let err = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect_err("second creation should abort");
    assert!(matches!(err, StoreError::AlreadyLinked { thread_id } if thread_id == existing));

    assert_eq!(thread_count(&conn), 1);
    assert_eq!(message_count(&conn), 1);
}

#[test]
fn a_response_message_can_start_its_own_thread_later() {
    let mut conn = test_conn();
    let first = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");
    reconcile_response(&mut conn, first, "gemini://a/y", "~bob", "Reply");

    // gemini://a/y responds to a thread but originates none, so creating a
    // thread from it is allowed and reuses the existing message row.
    let second = create_thread(&mut conn, &draft("gemini://a/y", "~bob", "Reply"))
        .expect("thread creation should work");
    assert_ne!(first, second);
    assert_eq!(message_count(&conn), 2);
}

fn reconcile_response(conn: &mut Connection, thread_id: i64, url: &str, author: &str, title: &str) {
    add_response(conn, thread_id, &draft(url, author, title)).expect("response should work");
}

#[test]
fn add_response_stamps_the_link_time_onto_the_thread() {
    let mut conn = test_conn();
    let thread_id = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");

    // Pre-existing message with an old creation time.
    let mut old = draft("gemini://a/y", "~bob", "Old post");
    old.dt_created = Some("2020-01-01 00:00:00Z".to_string());
    let old_id = resolve(&mut conn, &old).expect("resolution should work");

    let responded = add_response(&mut conn, thread_id, &draft("gemini://a/y", "~bob", "Old post"))
        .expect("response should work");
    assert_eq!(responded, old_id);

    let link_time: String = conn
        .query_row(
            "SELECT dt_created FROM responses WHERE threads_id = ?1 AND messages_id = ?2",
            params![thread_id, old_id],
            |row| row.get(0),
        )
        .expect("link row should exist");
    assert_ne!(link_time, "2020-01-01 00:00:00Z");

    let thread = threads::find_by_id(&conn, thread_id)
        .expect("lookup should work")
        .expect("thread should exist");
    assert_eq!(thread.dt_updated, link_time);

    // The message's own creation time is untouched.
    let stored = messages::find_by_id(&conn, old_id)
        .expect("lookup should work")
        .expect("message should exist");
    assert_eq!(stored.dt_created, "2020-01-01 00:00:00Z");
}

#[test]
fn add_response_requires_an_existing_thread() {
    let mut conn = test_conn();
    let err = add_response(&mut conn, 42, &draft("gemini://a/y", "~bob", "Reply"))
        .expect_err("responding to a missing thread should fail");
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(message_count(&conn), 0);
}

#[test]
fn a_message_may_respond_to_multiple_threads() {
    let mut conn = test_conn();
    let first = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");
    let second = create_thread(&mut conn, &draft("gemini://a/z", "~carol", "Second"))
        .expect("thread creation should work");

    reconcile_response(&mut conn, first, "gemini://a/y", "~bob", "Reply");
    reconcile_response(&mut conn, second, "gemini://a/y", "~bob", "Reply");

    assert_eq!(message_count(&conn), 3);
    let responder = messages::find_existing_by_url(&conn, "gemini://a/y")
        .expect("lookup should work")
        .expect("message should exist");
    let responding = threads::find_by_responding_message(&conn, responder.id)
        .expect("lookup should work");
    let mut ids: Vec<i64> = responding.iter().map(|t| t.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, [first, second]);
}

#[test]
fn refetching_an_origination_url_cascades_onto_its_thread() {
    let mut conn = test_conn();
    let thread_id = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");

    resolve(&mut conn, &draft("gemini://a/x", "~alice-renamed", "Retitled"))
        .expect("resolution should work");

    let thread = threads::find_by_id(&conn, thread_id)
        .expect("lookup should work")
        .expect("thread should exist");
    assert_eq!(thread.author, "~alice-renamed");
    assert_eq!(thread.title, "Retitled");
    assert_eq!(thread_count(&conn), 1);
}

#[test]
fn deleting_a_response_leaves_the_thread_with_its_origin_only() {
    let mut conn = test_conn();
    let thread_id = create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");
    let responder = add_response(&mut conn, thread_id, &draft("gemini://a/y", "~bob", "Reply"))
        .expect("response should work");

    messages::delete(&mut conn, responder).expect("delete should work");

    let listed = links::messages_for_thread(&conn, thread_id, true).expect("listing should work");
    let urls: Vec<&str> = listed.iter().map(|m| m.url.as_str()).collect();
    assert_eq!(urls, ["gemini://a/x"]);

    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM responses WHERE messages_id = ?1",
            params![responder],
            |row| row.get(0),
        )
        .expect("count should be readable");
    assert_eq!(orphans, 0);
}

#[test]
fn a_failed_composite_write_leaves_no_partial_state() {
    let mut conn = test_conn();
    create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect("thread creation should work");

    // AlreadyLinked aborts after the existence check; nothing is written.
    let before_threads = thread_count(&conn);
    let before_messages = message_count(&conn);
    create_thread(&mut conn, &draft("gemini://a/x", "~alice", "First"))
        .expect_err("second creation should abort");
    assert_eq!(thread_count(&conn), before_threads);
    assert_eq!(message_count(&conn), before_messages);

    // A missing thread aborts a response before the message is resolved.
    add_response(&mut conn, 99, &draft("gemini://a/q", "~dan", "Stray"))
        .expect_err("responding to a missing thread should fail");
    assert!(messages::find_existing_by_url(&conn, "gemini://a/q")
        .expect("lookup should work")
        .is_none());
}
