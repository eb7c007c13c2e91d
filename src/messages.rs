//! Message store: lookup, paginated listing, insert, update (with the
//! thread cascade), and delete (with link cleanup).
//!
//! Writes come in two forms: a standalone entry point that opens and commits
//! its own transaction, and an `_in_tx` entry point that executes inside a
//! caller-supplied scope and never commits.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::{map_message, Message, StoreError};
use crate::{links, threads};

const MESSAGE_COLUMNS: &str = "id, url, author, title, dt_created, summary";

/// Field set for a brand-new row; identity is assigned by the store.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub url: &'a str,
    pub author: &'a str,
    pub title: &'a str,
    pub dt_created: &'a str,
    pub summary: Option<&'a str>,
}

/// The mutable field set. `url`, `id`, and `dt_created` are never updated.
#[derive(Debug, Clone, Copy)]
pub struct MessageEdit<'a> {
    pub author: &'a str,
    pub title: &'a str,
    pub summary: Option<&'a str>,
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Message>, StoreError> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        params![id],
        map_message,
    )
    .optional()
    .map_err(Into::into)
}

/// Substring search when `partial` is set, otherwise an exact URL match.
/// The exact branch compares with `=`; `LIKE` would treat `_` and `%` in a
/// stored URL as wildcards and match unrelated rows.
pub fn find_by_url(conn: &Connection, url: &str, partial: bool) -> Result<Vec<Message>, StoreError> {
    let (predicate, pattern) = if partial {
        ("url LIKE ?1", format!("%{url}%"))
    } else {
        ("url = ?1", url.to_string())
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {predicate}"
    ))?;
    let mut rows = stmt.query(params![pattern])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(map_message(row)?);
    }
    Ok(result)
}

/// Exact-URL identity lookup. The unique index guarantees at most one row;
/// more than one is a fatal invariant violation.
pub fn find_existing_by_url(conn: &Connection, url: &str) -> Result<Option<Message>, StoreError> {
    let matches = find_by_url(conn, url, false)?;
    if matches.len() > 1 {
        return Err(StoreError::InvariantViolation(format!(
            "more than one message with the URL \"{url}\" has been found; unable to continue"
        )));
    }
    Ok(matches.into_iter().next())
}

pub fn list(
    conn: &Connection,
    offset: i64,
    limit: i64,
    ascending: bool,
) -> Result<Vec<Message>, StoreError> {
    let direction = if ascending { "ASC" } else { "DESC" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages \
         ORDER BY dt_created {direction} LIMIT ?1 OFFSET ?2"
    ))?;
    let mut rows = stmt.query(params![limit, offset])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(map_message(row)?);
    }
    Ok(result)
}

pub fn insert(conn: &mut Connection, message: &NewMessage<'_>) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    let id = insert_in_tx(&tx, message)?;
    tx.commit()?;
    Ok(id)
}

pub fn insert_in_tx(tx: &Transaction<'_>, message: &NewMessage<'_>) -> Result<i64, StoreError> {
    let inserted = tx.execute(
        "INSERT INTO messages(url, author, title, dt_created, summary) \
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            message.url,
            message.author,
            message.title,
            message.dt_created,
            message.summary
        ],
    );
    match inserted {
        Ok(_) => Ok(tx.last_insert_rowid()),
        Err(err) if is_unique_violation(&err) => {
            Err(StoreError::DuplicateUrl(message.url.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn update(conn: &mut Connection, id: i64, edit: &MessageEdit<'_>) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    update_in_tx(&tx, id, edit)?;
    tx.commit()?;
    Ok(())
}

/// Updates the mutable fields and, when this message originates a thread,
/// overwrites that thread's author and title to match.
pub fn update_in_tx(
    tx: &Transaction<'_>,
    id: i64,
    edit: &MessageEdit<'_>,
) -> Result<(), StoreError> {
    let changed = tx.execute(
        "UPDATE messages SET author = ?1, title = ?2, summary = ?3 WHERE id = ?4",
        params![edit.author, edit.title, edit.summary, id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("message {id}")));
    }
    if let Some(thread) = threads::find_by_originating_message(tx, id)? {
        threads::update_author_title_in_tx(tx, thread.id, edit.author, edit.title)?;
    }
    Ok(())
}

pub fn delete(conn: &mut Connection, id: i64) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    delete_in_tx(&tx, id)?;
    tx.commit()?;
    Ok(id)
}

/// Removes the row and every origination/response link that references it,
/// all inside the supplied scope. Deleting an unknown id is an error.
pub fn delete_in_tx(tx: &Transaction<'_>, id: i64) -> Result<(), StoreError> {
    links::delete_links_for_message_in_tx(tx, id)?;
    let removed = tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(StoreError::NotFound(format!("message {id}")));
    }
    Ok(())
}
