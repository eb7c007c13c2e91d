//! Link registry: the origination relation (one message starts one thread)
//! and the response relation (a message attached to a thread at a point in
//! time). A response link carries its own `dt_created`, the moment the link
//! was formed, which is distinct from the linked message's creation time.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::{map_message, Message, StoreError};

pub fn insert_origination_in_tx(
    tx: &Transaction<'_>,
    message_id: i64,
    thread_id: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO originations(messages_id, threads_id) VALUES(?1, ?2)",
        params![message_id, thread_id],
    )?;
    Ok(())
}

pub fn insert_response_in_tx(
    tx: &Transaction<'_>,
    thread_id: i64,
    message_id: i64,
    linked_at: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO responses(threads_id, messages_id, dt_created) VALUES(?1, ?2, ?3)",
        params![thread_id, message_id, linked_at],
    )?;
    Ok(())
}

/// Removes every link row referencing the message. Called by message deletion
/// inside the same transaction that removes the message row.
pub fn delete_links_for_message_in_tx(
    tx: &Transaction<'_>,
    message_id: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM responses WHERE messages_id = ?1",
        params![message_id],
    )?;
    tx.execute(
        "DELETE FROM originations WHERE messages_id = ?1",
        params![message_id],
    )?;
    Ok(())
}

/// The messages of a thread in reading order. Ascending order puts the
/// originating message first and responses oldest-first; descending order
/// puts responses newest-first and the originating message last. Response
/// rows carry the link time in `dt_created`, not the message's own creation
/// time. A thread with no origination row yields responses only.
pub fn messages_for_thread(
    conn: &Connection,
    thread_id: i64,
    ascending: bool,
) -> Result<Vec<Message>, StoreError> {
    let origin: Option<Message> = conn
        .query_row(
            "SELECT messages.id, messages.url, messages.author, messages.title, \
             messages.dt_created, messages.summary \
             FROM messages INNER JOIN originations ON messages.id = originations.messages_id \
             WHERE originations.threads_id = ?1",
            params![thread_id],
            map_message,
        )
        .optional()?;

    let sql = if ascending {
        "SELECT messages.id, messages.url, messages.author, messages.title, \
         responses.dt_created, messages.summary \
         FROM messages INNER JOIN responses ON messages.id = responses.messages_id \
         WHERE responses.threads_id = ?1 ORDER BY responses.dt_created ASC"
    } else {
        "SELECT messages.id, messages.url, messages.author, messages.title, \
         responses.dt_created, messages.summary \
         FROM messages INNER JOIN responses ON messages.id = responses.messages_id \
         WHERE responses.threads_id = ?1 ORDER BY responses.dt_created DESC"
    };
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![thread_id])?;
    let mut responses = Vec::new();
    while let Some(row) = rows.next()? {
        responses.push(map_message(row)?);
    }

    let mut result = Vec::new();
    if ascending {
        result.extend(origin);
        result.extend(responses);
    } else {
        result.extend(responses);
        result.extend(origin);
    }
    Ok(result)
}
