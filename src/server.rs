//! Listener loop: one OS thread per accepted SCGI connection, all sharing
//! the single storage handle. The storage engine serializes writers; no
//! other in-process coordination exists.

use std::error::Error;
use std::fmt;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::{Config, ConfigError};
use crate::db::{self, StoreError};
use crate::fetch::{Fetch, GeminiFetcher};
use crate::routes::{self, RouteContext};

pub fn run(config: Config) -> Result<(), AppError> {
    let conn = db::open_connection(&config.database_path)?;
    let db = Arc::new(Mutex::new(conn));
    let config = Arc::new(config);
    let fetcher: Arc<dyn Fetch> = Arc::new(GeminiFetcher::new());

    // A stale socket from an earlier run would make bind fail.
    remove_socket_file(&config.socket_path)?;
    let listener = UnixListener::bind(&config.socket_path)?;
    eprintln!("listening on {}", config.socket_path);

    // On SIGINT/SIGTERM, remove the socket file before exiting so the next
    // start binds without cleanup.
    let socket_path = config.socket_path.clone();
    ctrlc::set_handler(move || {
        if let Err(err) = remove_socket_file(&socket_path) {
            eprintln!("error removing {socket_path}: {err}");
        }
        std::process::exit(0);
    })?;

    for incoming in listener.incoming() {
        match incoming {
            Ok(mut stream) => {
                let db = Arc::clone(&db);
                let config = Arc::clone(&config);
                let fetcher = Arc::clone(&fetcher);
                thread::spawn(move || {
                    let ctx = RouteContext {
                        config: &config,
                        db: &db,
                        fetcher: fetcher.as_ref(),
                    };
                    routes::handle_request(&mut stream, &ctx);
                });
            }
            Err(err) => eprintln!("accept error: {err}"),
        }
    }
    Ok(())
}

fn remove_socket_file(path: &str) -> Result<(), std::io::Error> {
    if Path::new(path).exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Config(ConfigError),
    Store(StoreError),
    Signal(ctrlc::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Signal(err) => write!(f, "error installing signal handler: {}", err),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Signal(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<ctrlc::Error> for AppError {
    fn from(value: ctrlc::Error) -> Self {
        AppError::Signal(value)
    }
}
