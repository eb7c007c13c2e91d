use std::error::Error;
use std::fmt;
use std::time::Duration;

use rusqlite::{Connection, DatabaseName, Row};
use time::macros::format_description;
use time::OffsetDateTime;

// The on-disk schema is a compatibility contract: four tables plus the
// unique URL index, nothing else. Link-table columns keep their historical
// `threads_id` / `messages_id` names. Cascade deletes are enforced by the
// application inside the deleting transaction, so foreign_keys stays off.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id INTEGER NOT NULL PRIMARY KEY,
    author TEXT NOT NULL,
    title TEXT NOT NULL,
    dt_created TEXT NOT NULL,
    dt_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER NOT NULL PRIMARY KEY,
    url TEXT NOT NULL,
    author TEXT NOT NULL,
    title TEXT NOT NULL,
    dt_created TEXT NOT NULL,
    summary TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS url_index ON messages(url);

CREATE TABLE IF NOT EXISTS responses (
    threads_id INTEGER,
    messages_id INTEGER,
    dt_created TEXT NOT NULL,
    FOREIGN KEY(threads_id) REFERENCES threads(id),
    FOREIGN KEY(messages_id) REFERENCES messages(id)
);

CREATE TABLE IF NOT EXISTS originations (
    messages_id INTEGER,
    threads_id INTEGER,
    FOREIGN KEY(messages_id) REFERENCES messages(id),
    FOREIGN KEY(threads_id) REFERENCES threads(id)
);
"#;

pub fn open_connection(path: &str) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    create_tables(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    // The bundled SQLite is compiled with SQLITE_DEFAULT_FOREIGN_KEYS=1, so
    // the documented "stays off" contract needs an explicit pragma.
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "OFF")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn drop_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
DROP TABLE IF EXISTS responses;
DROP TABLE IF EXISTS originations;
DROP TABLE IF EXISTS messages;
DROP TABLE IF EXISTS threads;
"#,
    )?;
    Ok(())
}

/// Fixed textual timestamp used for every date column: UTC, lexicographically
/// sortable, second precision.
pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]Z"
        ))
        .expect("fixed UTC timestamp format should never fail")
}

/// A unit of content identified by its external source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub url: String,
    pub author: String,
    pub title: String,
    pub dt_created: String,
    pub summary: Option<String>,
}

/// A discussion rooted at one originating message. `dt_updated` is empty
/// until the first response is linked and thereafter tracks the most recent
/// response link time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: i64,
    pub author: String,
    pub title: String,
    pub dt_created: String,
    pub dt_updated: String,
}

// Every query path maps rows through these two functions so the
// schema-to-entity contract lives in one place.
pub(crate) fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        url: row.get(1)?,
        author: row.get(2)?,
        title: row.get(3)?,
        dt_created: row.get(4)?,
        summary: row.get(5)?,
    })
}

pub(crate) fn map_thread(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        author: row.get(1)?,
        title: row.get(2)?,
        dt_created: row.get(3)?,
        dt_updated: row.get(4)?,
    })
}

#[derive(Debug)]
pub enum StoreError {
    Db(rusqlite::Error),
    NotFound(String),
    DuplicateUrl(String),
    InvariantViolation(String),
    AlreadyLinked { thread_id: i64 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Db(err) => write!(f, "database error: {}", err),
            StoreError::NotFound(what) => write!(f, "{} not found", what),
            StoreError::DuplicateUrl(url) => {
                write!(f, "a message with the URL \"{}\" already exists", url)
            }
            StoreError::InvariantViolation(message) => write!(f, "{}", message),
            StoreError::AlreadyLinked { thread_id } => write!(
                f,
                "thread for this message already exists with ID {}",
                thread_id
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        StoreError::Db(value)
    }
}
