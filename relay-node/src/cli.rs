//! `clap`-derived CLI (spec §4.K): `--config`, `--data-dir`, `--bind`, and a
//! `rescan --from <height>` subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Bitcoin outpoint/script subscription relay")]
pub struct Args {
    /// Path to a TOML config file. Missing is not an error; environment
    /// overrides and flags still apply.
    #[arg(long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the config file.
    #[arg(long, env = "RELAY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides `bind` from the config file.
    #[arg(long, env = "RELAY_BIND")]
    pub bind: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replays blocks from `--from` through the current chain tip and exits,
    /// instead of serving the HTTP boundary.
    Rescan {
        #[arg(long)]
        from: u32,
    },
}
