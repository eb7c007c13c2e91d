//! Thread store: lookups by id and by linked message, paginated listing,
//! and the narrow writes used by the composite operations. Threads are
//! created only through `reconcile::create_thread` and are never deleted.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::{map_thread, StoreError, Thread};

/// Sort key for thread listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOrder {
    Created,
    Updated,
}

/// Field set for the row inserted by thread creation. `dt_updated` always
/// starts empty; it is only ever written by response linking.
#[derive(Debug, Clone, Copy)]
pub struct NewThread<'a> {
    pub author: &'a str,
    pub title: &'a str,
    pub dt_created: &'a str,
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Thread>, StoreError> {
    conn.query_row(
        "SELECT id, author, title, dt_created, dt_updated FROM threads WHERE id = ?1",
        params![id],
        map_thread,
    )
    .optional()
    .map_err(Into::into)
}

/// The thread started by the given message, if any. At most one row is
/// expected; origination is one-to-one per thread.
pub fn find_by_originating_message(
    conn: &Connection,
    message_id: i64,
) -> Result<Option<Thread>, StoreError> {
    conn.query_row(
        "SELECT threads.id, threads.author, threads.title, threads.dt_created, threads.dt_updated \
         FROM threads INNER JOIN originations ON threads.id = originations.threads_id \
         WHERE originations.messages_id = ?1",
        params![message_id],
        map_thread,
    )
    .optional()
    .map_err(Into::into)
}

/// Every thread the given message was linked to as a response.
pub fn find_by_responding_message(
    conn: &Connection,
    message_id: i64,
) -> Result<Vec<Thread>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT threads.id, threads.author, threads.title, threads.dt_created, threads.dt_updated \
         FROM threads INNER JOIN responses ON threads.id = responses.threads_id \
         WHERE responses.messages_id = ?1",
    )?;
    let mut rows = stmt.query(params![message_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(map_thread(row)?);
    }
    Ok(result)
}

pub fn list(
    conn: &Connection,
    offset: i64,
    limit: i64,
    order: ThreadOrder,
    ascending: bool,
) -> Result<Vec<Thread>, StoreError> {
    let sql = match (order, ascending) {
        (ThreadOrder::Created, true) => {
            "SELECT id, author, title, dt_created, dt_updated FROM threads \
             ORDER BY dt_created ASC LIMIT ?1 OFFSET ?2"
        }
        (ThreadOrder::Created, false) => {
            "SELECT id, author, title, dt_created, dt_updated FROM threads \
             ORDER BY dt_created DESC LIMIT ?1 OFFSET ?2"
        }
        (ThreadOrder::Updated, true) => {
            "SELECT id, author, title, dt_created, dt_updated FROM threads \
             ORDER BY dt_updated ASC LIMIT ?1 OFFSET ?2"
        }
        (ThreadOrder::Updated, false) => {
            "SELECT id, author, title, dt_created, dt_updated FROM threads \
             ORDER BY dt_updated DESC LIMIT ?1 OFFSET ?2"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![limit, offset])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(map_thread(row)?);
    }
    Ok(result)
}

pub fn insert_in_tx(tx: &Transaction<'_>, thread: &NewThread<'_>) -> Result<i64, StoreError> {
    tx.execute(
        "INSERT INTO threads(author, title, dt_created, dt_updated) VALUES(?1, ?2, ?3, '')",
        params![thread.author, thread.title, thread.dt_created],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Cascade target for message updates: overwrite the thread header to match
/// its (edited) originating message.
pub fn update_author_title_in_tx(
    tx: &Transaction<'_>,
    id: i64,
    author: &str,
    title: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE threads SET author = ?1, title = ?2 WHERE id = ?3",
        params![author, title, id],
    )?;
    Ok(())
}

/// Records the latest response link time on the thread.
pub fn touch_updated_in_tx(tx: &Transaction<'_>, id: i64, linked_at: &str) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE threads SET dt_updated = ?1 WHERE id = ?2",
        params![linked_at, id],
    )?;
    Ok(())
}
