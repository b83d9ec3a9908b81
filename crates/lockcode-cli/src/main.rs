//! `LockCode` CLI
//!
//! Manage key codes on electronic door locks.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use lockcode_cli::context::Context;
use lockcode_cli::key_cmd::{self, KeyAction};
use lockcode_cli::queue_cmd::{self, QueueAction};
use lockcode_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "lockcode")]
#[command(version, about = "Key code management for electronic door locks", long_about = None)]
struct Cli {
    /// Settings file to use instead of the global and project settings.
    #[arg(long, global = true, env = "LOCKCODE_CONFIG")]
    config: Option<PathBuf>,

    /// Target device; most commands fan out to every lock when omitted.
    #[arg(short = 'd', long, global = true)]
    device_id: Option<i64>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Print command output as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured devices.
    Devices {
        /// Only devices whose name contains this (case-insensitive).
        #[arg(long)]
        filter: Option<String>,
    },
    #[command(flatten)]
    Key(KeyAction),
    #[command(flatten)]
    Queue(QueueAction),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref(), cli.device_id, cli.json)?;

    let default_filter = format!("lockcode={}", ctx.config.log_level);
    init_tracing(&default_filter, cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting lockcode CLI");

    match cli.command {
        Command::Devices { filter } => devices(&ctx, filter.as_deref()),
        Command::Key(action) => key_cmd::run(action, &ctx).await,
        Command::Queue(action) => queue_cmd::run(action, &ctx).await,
    }
}

fn devices(ctx: &Context, filter: Option<&str>) -> anyhow::Result<()> {
    let devices = ctx.fleet.list_devices(filter);
    let mut out = io::stdout();
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string(&devices)?)?;
        return Ok(());
    }
    if devices.is_empty() {
        writeln!(out, "No devices configured")?;
        return Ok(());
    }
    writeln!(out, "{:<6} NAME", "ID")?;
    for d in &devices {
        writeln!(out, "{:<6} {}", d.id, d.name)?;
    }
    Ok(())
}
