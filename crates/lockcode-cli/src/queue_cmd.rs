//! Reconciliation subcommands: enqueue, reconcile, processed.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::sync::Arc;

use tracing::info;

use lockcode_core::clock::unix_timestamp_f64;
use lockcode_core::model::{validate_code, validate_username};
use lockcode_reconcile::{ReconcileProcessor, ReconcileReport, request_hash};

use crate::context::Context;

/// Reconciliation subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum QueueAction {
    /// Queue a key code for later application. Without --device-id it
    /// targets every lock.
    Enqueue {
        #[arg(long)]
        username: String,
        #[arg(long)]
        code: String,
        /// Submission time in seconds since the epoch (defaults to now).
        #[arg(long)]
        timestamp: Option<f64>,
    },
    /// Apply queued changes to the fleet.
    Reconcile {
        /// Keep polling the queue until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Show the most recently processed changes.
    Processed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

/// Execute a reconciliation subcommand.
pub async fn run(action: QueueAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        QueueAction::Enqueue {
            username,
            code,
            timestamp,
        } => enqueue(ctx, &username, &code, timestamp).await,
        QueueAction::Reconcile { watch } => reconcile(ctx, watch).await,
        QueueAction::Processed { limit } => processed(ctx, limit).await,
    }
}

async fn enqueue(
    ctx: &Context,
    username: &str,
    code: &str,
    timestamp: Option<f64>,
) -> anyhow::Result<()> {
    validate_code(code, ctx.config.engine.code_length)?;
    validate_username(username)?;
    if let Some(id) = ctx.device_id {
        ctx.fleet.registry().get_device(id)?;
    }

    let db = ctx.open_database().await?;
    let timestamp = timestamp.unwrap_or_else(unix_timestamp_f64);
    let change = db
        .enqueue_pending(ctx.device_id, code, username, timestamp)
        .await?;
    let hash = request_hash(change.timestamp, &change.code, &change.username);

    let mut out = io::stdout();
    if ctx.json {
        writeln!(
            out,
            "{}",
            serde_json::json!({ "id": change.id, "request_hash": hash, "change": change })
        )?;
    } else {
        writeln!(out, "Queued change {} ({hash})", change.id)?;
    }
    Ok(())
}

fn print_report(out: &mut impl Write, report: &ReconcileReport, json: bool) -> io::Result<()> {
    if json {
        return writeln!(out, "{}", serde_json::to_string(report)?);
    }
    writeln!(
        out,
        "applied {}, failed {}, skipped {}, errors {}",
        report.applied, report.failed, report.skipped, report.errors
    )
}

async fn reconcile(ctx: &Context, watch: bool) -> anyhow::Result<()> {
    let db = ctx.open_database().await?;
    let processor = ReconcileProcessor::new(Arc::new(db), ctx.fleet.clone())
        .with_max_concurrency(ctx.config.reconcile.max_concurrency);

    if !watch {
        let report = processor.run_once().await?;
        print_report(&mut io::stdout(), &report, ctx.json)?;
        return Ok(());
    }

    processor
        .run_until(ctx.config.reconcile.poll_interval(), shutdown_signal())
        .await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}

async fn processed(ctx: &Context, limit: u32) -> anyhow::Result<()> {
    let db = ctx.open_database().await?;
    let rows = db.list_processed(limit).await?;
    let pending = db.count_pending().await?;
    let mut out = io::stdout();

    if ctx.json {
        writeln!(out, "{}", serde_json::to_string(&rows)?)?;
        return Ok(());
    }
    writeln!(out, "{pending} change(s) pending")?;
    if rows.is_empty() {
        writeln!(out, "No processed changes")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:<6} {:<6} {:<16} {:<10} {:<8} MESSAGE",
        "ID", "LOCK", "USER", "CODE", "RESULT"
    )?;
    for r in &rows {
        let lock = r
            .lock_id
            .map_or_else(|| "all".to_string(), |id| id.to_string());
        let result = if r.success { "ok" } else { "failed" };
        writeln!(
            out,
            "{:<6} {:<6} {:<16} {:<10} {:<8} {}",
            r.id, lock, r.username, r.code, result, r.message
        )?;
    }
    Ok(())
}
