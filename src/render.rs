//! Gemtext page fragments for messages and threads, composed by the route
//! handlers into full responses.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rusqlite::Connection;

use crate::config::Config;
use crate::db::{Message, StoreError, Thread};
use crate::threads;

/// Link line for a message: the source URL, attribution, and timestamp, with
/// the summary when one was extracted.
pub fn message_link(message: &Message) -> String {
    let mut text = format!(
        "=> {} {} — {}\r\n{}",
        message.url, message.author, message.title, message.dt_created
    );
    if let Some(summary) = non_empty(&message.summary) {
        text.push_str(&format!(" - {summary}"));
    }
    text.push_str("\r\n");
    text
}

/// Link to this server's own page for a message.
pub fn message_ref(config: &Config, message: &Message) -> String {
    format!(
        "=> {}/messages/{} MessageID: {}\r\n",
        config.server_url, message.id, message.id
    )
}

/// Preformatted block with the message's source URL and fields.
pub fn message_text_block(message: &Message) -> String {
    let mut text = format!(
        "```\r\nMessage Source URL: {}\r\n{} — {}\r\n{}",
        message.url, message.author, message.title, message.dt_created
    );
    if let Some(summary) = non_empty(&message.summary) {
        text.push_str(&format!(" - {summary}"));
    }
    text.push_str("\r\n```\r\n");
    text
}

pub fn message_full(config: &Config, message: &Message) -> String {
    let mut text = format!("Message {}\r\n", message.id);
    text.push_str(&message_ref(config, message));
    text.push_str(&message_link(message));
    text
}

/// The full message page: the message itself, a refetch link, the thread it
/// originates (if any), and the threads it responds to.
pub fn message_instances(
    config: &Config,
    conn: &Connection,
    message: &Message,
) -> Result<String, StoreError> {
    let mut text = format!("## Message ID {}\r\n", message.id);
    text.push_str(&message_ref(config, message));
    text.push_str(&message_text_block(message));
    text.push_str(&format!(
        "=> {}/messages/{}/update?{} Refetch and update this message\r\n",
        config.server_url,
        message.id,
        utf8_percent_encode(&message.url, NON_ALPHANUMERIC)
    ));

    if let Some(thread) = threads::find_by_originating_message(conn, message.id)? {
        text.push_str(&format!(
            "### Message {} initiates thread ID {}\r\n",
            message.id, thread.id
        ));
        text.push_str(&thread_line(config, &thread));
    }

    let responding = threads::find_by_responding_message(conn, message.id)?;
    if !responding.is_empty() {
        text.push_str(&format!(
            "### Message {} is a response to the following threads:\r\n",
            message.id
        ));
        for thread in &responding {
            text.push_str(&thread_line(config, thread));
        }
    }

    Ok(text)
}

/// Link line for a thread with its last-response annotation.
pub fn thread_line(config: &Config, thread: &Thread) -> String {
    let mut text = format!(
        "=> {}/threads/{} {}: {} — {}\r\n",
        config.server_url, thread.id, thread.dt_created, thread.author, thread.title
    );
    if thread.dt_updated.is_empty() {
        text.push_str("* No responses\r\n");
    } else {
        text.push_str(&format!("* Last response on {}\r\n", thread.dt_updated));
    }
    text
}

fn non_empty(summary: &Option<String>) -> Option<&str> {
    summary.as_deref().filter(|text| !text.is_empty())
}
