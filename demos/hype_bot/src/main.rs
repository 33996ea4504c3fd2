//! Hype Bot
//!
//! A bot you talk to from the terminal. Each line you type is a message in
//! `#console`; lines starting with `/` switch user or room (`/as root`,
//! `/join #ops`, `/dm`, `/quit`).
//!
//! # Usage
//!
//! ```bash
//! cargo run --package hype-bot -- --owner
//! HYPE_PROFILE=production cargo run --package hype-bot -- --config hype.toml
//! ```
//!
//! Then try `!help`, `!ping`, `!give bob 5` or `!remind 10 tea`.

mod plugins;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use hype::prelude::*;
use hype::runtime::ConfigLoader;
use hype_adapter_console::{ConsoleChannel, ConsoleConfig};
use tokio::io::BufReader;

use crate::plugins::{Basics, Coins, Jobs};

#[derive(Debug, Parser)]
#[command(name = "hype-bot", version, about = "Talk to a Hype bot from the terminal")]
struct Args {
    /// Configuration file (default: search for hype.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production or a custom name)
    #[arg(short, long)]
    profile: Option<String>,

    /// Use the development prefix
    #[arg(long)]
    dev: bool,

    /// User you start as
    #[arg(short, long, default_value = "you")]
    user: String,

    /// Room you start in
    #[arg(short, long, default_value = "#console")]
    room: String,

    /// Make the starting user a bot owner
    #[arg(long)]
    owner: bool,
}

impl Args {
    fn load_config(&self) -> Result<HypeConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(profile) = &self.profile {
            loader = loader.profile(profile);
        }
        if let Some(path) = &self.config {
            loader = loader.file(path);
        }
        let mut config = loader.load()?;

        config.bot.dev |= self.dev;
        if self.owner {
            config.permissions.owners.push(format!("console:{}", self.user));
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    let console = ConsoleChannel::new(
        ConsoleConfig {
            user: args.user.clone(),
            room: args.room.clone(),
            ..Default::default()
        },
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );

    HypeRuntime::builder()
        .config(config)
        .channel(console)
        .plugin(Basics)
        .plugin(Coins)
        .plugin(Jobs)
        .build()?
        .run()
        .await?;

    Ok(())
}
