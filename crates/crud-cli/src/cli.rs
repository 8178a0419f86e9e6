use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crud_store::Format;

#[derive(Parser)]
#[command(
    name = "crud",
    about = "Inspect a crudstore record directory",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Store configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Record directory; overrides the configuration
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Record file format; overrides the configuration
    #[arg(long, global = true)]
    pub format: Option<Format>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List record ids
    List,
    /// Print one record
    Show(ShowArgs),
    /// Delete one record
    Rm(RmArgs),
    /// Report undecodable records and leftover temp files
    Check(CheckArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Remove leftover temp files
    #[arg(long)]
    pub sweep: bool,
}
