use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "gemloom")]
#[command(bin_name = "gemloom")]
#[command(version)]
#[command(about = "A threaded-discussion SCGI server for Gemini space")]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        env = "GEMLOOM_CONFIG",
        default_value = "gemloom.toml",
        help = "Path to the gemloom configuration file."
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run the SCGI server (the default).")]
    Serve,
    #[command(about = "Drop and recreate all tables, discarding every thread and message.")]
    Reset,
}
