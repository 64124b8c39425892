//! autocodex — an IRC bot that talks in the voice of a chat corpus.
//!
//! `autocodex run` joins a channel, posts generated text on a randomized
//! schedule, and answers anyone who addresses it by nick. Text comes from
//! an external generator program. `autocodex filter` prepares that
//! program's corpus from a raw chat log.

mod bot;
mod config;
mod constants;
mod corpus;
mod irc;
mod util;

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};
use crate::constants::{APP_NAME, APP_VERSION};
use crate::corpus::CorpusFilter;

// ── Command line ─────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about = "IRC bot backed by an external text generator")]
struct Cli {
    /// Config file (default: $AUTOCODEX_CONFIG, ./autocodex.toml, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and run the bot (the default).
    Run(RunArgs),
    /// Turn a raw chat log into a generator corpus on stdout.
    Filter {
        /// Tab-separated log: timestamp, nick, message.
        log: PathBuf,
    },
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    nick: Option<String>,
}

impl RunArgs {
    fn overrides(self) -> Overrides {
        Overrides {
            server: self.server,
            port: self.port,
            channel: self.channel,
            nickname: self.nick,
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (mut config, source) = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            config.apply(&args.overrides());
            config.validate().context("invalid configuration")?;
            info!(
                version = APP_VERSION,
                config = %source.label(),
                server = %config.irc.server,
                channel = %config.irc.channel,
                nick = %config.irc.nickname,
                "starting"
            );

            tokio::select! {
                result = bot::start(config) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    Ok(())
                }
            }
        }
        Command::Filter { log } => run_filter(&config, &log),
    }
}

/// Logs go to stderr so `filter` output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_filter(config: &Config, log: &Path) -> Result<()> {
    let filter = CorpusFilter::new(&config.corpus)?;
    let file = File::open(log).with_context(|| format!("open log {}", log.display()))?;

    let stdout = io::stdout();
    let stats = filter.run(BufReader::new(file), BufWriter::new(stdout.lock()))?;
    info!(read = stats.read, kept = stats.kept, "corpus filtered");
    Ok(())
}
