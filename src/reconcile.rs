//! Reconciliation engine: maps freshly retrieved content onto an existing
//! message (update in place, preserving identity and original creation time)
//! or a new one (insert), and hosts the composite write operations that link
//! the resolved message to a thread inside a single transaction.
//!
//! Both creating a thread and adding a response run the same resolution, so
//! re-submitting a URL never creates a duplicate message, it only refreshes
//! the stored fields.

use rusqlite::{Connection, Transaction};

use crate::db::{now_timestamp, StoreError};
use crate::messages::{MessageEdit, NewMessage};
use crate::threads::NewThread;
use crate::{links, messages, threads};

/// Externally retrieved content as handed over by the parse step. A missing
/// `dt_created` means the creation time is unknown and retrieval time is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    pub url: String,
    pub author: String,
    pub title: String,
    pub summary: Option<String>,
    pub dt_created: Option<String>,
}

/// Resolves the draft to a message id inside the supplied scope.
///
/// An existing row with the same URL keeps its id and original `dt_created`;
/// the draft's author/title/summary overwrite the stored fields (cascading to
/// an originated thread, if any). Otherwise a new row is inserted.
pub fn resolve_in_tx(tx: &Transaction<'_>, draft: &MessageDraft) -> Result<i64, StoreError> {
    if let Some(existing) = messages::find_existing_by_url(tx, &draft.url)? {
        messages::update_in_tx(
            tx,
            existing.id,
            &MessageEdit {
                author: &draft.author,
                title: &draft.title,
                summary: draft.summary.as_deref(),
            },
        )?;
        return Ok(existing.id);
    }

    let dt_created = match &draft.dt_created {
        Some(supplied) => supplied.clone(),
        None => now_timestamp(),
    };
    messages::insert_in_tx(
        tx,
        &NewMessage {
            url: &draft.url,
            author: &draft.author,
            title: &draft.title,
            dt_created: &dt_created,
            summary: draft.summary.as_deref(),
        },
    )
}

pub fn create_thread(conn: &mut Connection, draft: &MessageDraft) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    let thread_id = create_thread_in_tx(&tx, draft)?;
    tx.commit()?;
    Ok(thread_id)
}

/// Creates a thread originated by the draft's message: thread row, message
/// resolution, and origination link share the supplied scope.
///
/// If the URL already identifies a message that originates a thread, the
/// create aborts with `AlreadyLinked` carrying the existing thread id. The
/// check and the insert are not serializable against a concurrent identical
/// request; the URL unique index prevents duplicate messages but not a second
/// thread (accepted, see DESIGN.md).
pub fn create_thread_in_tx(tx: &Transaction<'_>, draft: &MessageDraft) -> Result<i64, StoreError> {
    if let Some(existing) = messages::find_existing_by_url(tx, &draft.url)? {
        if let Some(thread) = threads::find_by_originating_message(tx, existing.id)? {
            return Err(StoreError::AlreadyLinked {
                thread_id: thread.id,
            });
        }
    }

    let thread_id = threads::insert_in_tx(
        tx,
        &NewThread {
            author: &draft.author,
            title: &draft.title,
            dt_created: &now_timestamp(),
        },
    )?;
    let message_id = resolve_in_tx(tx, draft)?;
    links::insert_origination_in_tx(tx, message_id, thread_id)?;
    Ok(thread_id)
}

pub fn add_response(
    conn: &mut Connection,
    thread_id: i64,
    draft: &MessageDraft,
) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    let message_id = add_response_in_tx(&tx, thread_id, draft)?;
    tx.commit()?;
    Ok(message_id)
}

/// Links the draft's resolved message to the thread as a response. The link
/// timestamp is the link time, never the message's own creation time, and the
/// thread's `dt_updated` is set to that same link time.
pub fn add_response_in_tx(
    tx: &Transaction<'_>,
    thread_id: i64,
    draft: &MessageDraft,
) -> Result<i64, StoreError> {
    if threads::find_by_id(tx, thread_id)?.is_none() {
        return Err(StoreError::NotFound(format!("thread {thread_id}")));
    }

    let message_id = resolve_in_tx(tx, draft)?;
    let linked_at = now_timestamp();
    links::insert_response_in_tx(tx, thread_id, message_id, &linked_at)?;
    threads::touch_updated_in_tx(tx, thread_id, &linked_at)?;
    Ok(message_id)
}

#[cfg(test)]
mod tests;
