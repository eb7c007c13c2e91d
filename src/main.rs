mod cli;
mod config;
mod db;
mod fetch;
mod gemtext;
mod links;
mod messages;
mod reconcile;
mod render;
mod routes;
mod scgi;
mod server;
mod threads;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::server::AppError;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = config::load(&cli.config)?;

    match cli.command {
        None | Some(Commands::Serve) => server::run(config),
        Some(Commands::Reset) => {
            let conn = db::open_connection(&config.database_path)?;
            db::drop_tables(&conn)?;
            db::create_tables(&conn)?;
            println!("database reset at {}", config.database_path);
            Ok(())
        }
    }
}
