//! Key code subcommands: list, get, create, delete, update, next-position.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use serde::Serialize;
use tokio_stream::StreamExt;

use lockcode_core::{DeviceOutcome, FleetResults, LockCode};

use crate::context::Context;

/// Key code subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum KeyAction {
    /// List the key codes stored on a device.
    List,
    /// Look up a user's key code on a device.
    Get {
        #[arg(long)]
        username: String,
        /// Also match an entry holding this code.
        #[arg(long)]
        code: Option<String>,
    },
    /// Create a key code on a device, or on every lock when no device is given.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        code: String,
    },
    /// Delete a user's key code from a device, or from every lock.
    Delete {
        #[arg(long)]
        username: String,
    },
    /// Replace a user's key code on a device.
    Update {
        #[arg(long)]
        username: String,
        #[arg(long)]
        code: String,
    },
    /// Show the slot the next created code would occupy.
    NextPosition,
}

/// Execute a key code subcommand.
pub async fn run(action: KeyAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        KeyAction::List => list(ctx).await,
        KeyAction::Get { username, code } => get(ctx, &username, code.as_deref()).await,
        KeyAction::Create { username, code } => create(ctx, &username, &code).await,
        KeyAction::Delete { username } => delete(ctx, &username).await,
        KeyAction::Update { username, code } => update(ctx, &username, &code).await,
        KeyAction::NextPosition => next_position(ctx).await,
    }
}

/// One line of fan-out output.
#[derive(Debug, Serialize)]
struct OutcomeLine<'a, T: Serialize> {
    device_id: i64,
    device_name: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a, T: Serialize> OutcomeLine<'a, T> {
    fn new(outcome: &'a DeviceOutcome<T>) -> Self {
        Self {
            device_id: outcome.device.id,
            device_name: &outcome.device.name,
            success: outcome.is_success(),
            result: outcome.result.as_ref().ok(),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        }
    }
}

fn print_codes(out: &mut impl Write, codes: &[LockCode], json: bool) -> io::Result<()> {
    if json {
        return writeln!(out, "{}", serde_json::to_string(codes)?);
    }
    if codes.is_empty() {
        return writeln!(out, "No key codes");
    }
    writeln!(out, "{:<8} {:<12} NAME", "POSITION", "CODE")?;
    for c in codes {
        writeln!(out, "{:<8} {:<12} {}", c.position, c.code, c.name)?;
    }
    Ok(())
}

/// Print each outcome as the device finishes. Fails if any device failed.
async fn stream_outcomes<T: Serialize>(
    mut results: FleetResults<T>,
    json: bool,
    describe: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    let mut out = io::stdout();
    let (mut total, mut failed) = (0usize, 0usize);
    while let Some(outcome) = results.next().await {
        total += 1;
        if json {
            writeln!(out, "{}", serde_json::to_string(&OutcomeLine::new(&outcome))?)?;
        } else {
            match &outcome.result {
                Ok(value) => writeln!(
                    out,
                    "{:<6} {:<24} {}",
                    outcome.device.id,
                    outcome.device.name,
                    describe(value)
                )?,
                Err(e) => writeln!(
                    out,
                    "{:<6} {:<24} failed: {e}",
                    outcome.device.id, outcome.device.name
                )?,
            }
        }
        if !outcome.is_success() {
            failed += 1;
        }
    }
    if total == 0 {
        anyhow::bail!("No locks matched");
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {total} devices failed");
    }
    Ok(())
}

async fn list(ctx: &Context) -> anyhow::Result<()> {
    let codes = ctx.fleet.list_key_codes(ctx.require_device()?).await?;
    print_codes(&mut io::stdout(), &codes, ctx.json)?;
    Ok(())
}

async fn get(ctx: &Context, username: &str, code: Option<&str>) -> anyhow::Result<()> {
    let device_id = ctx.require_device()?;
    let found = ctx.fleet.get_key_code(username, device_id, code).await?;
    let mut out = io::stdout();
    match (found, ctx.json) {
        (found, true) => writeln!(out, "{}", serde_json::to_string(&found)?)?,
        (Some(c), false) => writeln!(out, "{} {} (position {})", c.name, c.code, c.position)?,
        (None, false) => writeln!(out, "No key code for {username} on device {device_id}")?,
    }
    Ok(())
}

async fn create(ctx: &Context, username: &str, code: &str) -> anyhow::Result<()> {
    let request = lockcode_core::CreateKeyCodeRequest::new(code, username, ctx.device_id);
    let results = ctx.fleet.create_key_code(request)?;
    stream_outcomes(results, ctx.json, |r| {
        format!("created at position {}", r.position)
    })
    .await
}

async fn delete(ctx: &Context, username: &str) -> anyhow::Result<()> {
    let Some(device_id) = ctx.device_id else {
        let results = ctx.fleet.delete_key_code_on_all_devices(username);
        return stream_outcomes(results, ctx.json, |r| r.message.clone()).await;
    };
    let result = ctx.fleet.delete_key_code(username, device_id).await?;
    let mut out = io::stdout();
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    } else {
        writeln!(out, "{}", result.message)?;
    }
    Ok(())
}

async fn update(ctx: &Context, username: &str, code: &str) -> anyhow::Result<()> {
    let result = ctx
        .fleet
        .update_key_code(ctx.require_device()?, username, code)
        .await?;
    let mut out = io::stdout();
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    } else {
        writeln!(out, "{}", result.message)?;
    }
    if !result.success {
        anyhow::bail!("Update failed");
    }
    Ok(())
}

async fn next_position(ctx: &Context) -> anyhow::Result<()> {
    let position = ctx.fleet.next_position(ctx.require_device()?).await?;
    let mut out = io::stdout();
    if ctx.json {
        writeln!(out, "{}", serde_json::json!({ "position": position }))?;
    } else {
        writeln!(out, "{position}")?;
    }
    Ok(())
}
