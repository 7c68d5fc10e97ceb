//! Following a submitted job
//!
//! Wraps the job's watch with the deadline and Ctrl-C handling the library
//! deliberately leaves to callers.

use anyhow::Result;
use arena_jobs::{Job, JobError};
use clap::{Args, ValueEnum};
use colored::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What to wait for after submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WaitFor {
    /// Return as soon as the backend accepted the workload
    None,
    /// Wait until the workload is running
    Startup,
    /// Wait until the workload finished successfully
    Completion,
}

/// Watch options shared by every launch command
#[derive(Debug, Clone, Default, Args)]
pub struct WaitArgs {
    /// What to wait for (defaults to completion for builds, startup otherwise)
    #[arg(long, value_enum)]
    pub wait: Option<WaitFor>,

    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl WaitArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Watches the job until the requested state, a deadline, or Ctrl-C
pub async fn follow(job: &dyn Job, wait_for: WaitFor, timeout: Option<Duration>) -> Result<()> {
    if wait_for == WaitFor::None {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let _guard = spawn_interrupt_handler(cancel.clone(), timeout);

    println!("  Waiting for {}...", describe(wait_for).dimmed());

    let result = match wait_for {
        WaitFor::Startup => job.watch_to_startup(&cancel).await,
        WaitFor::Completion => job.watch_to_completion(&cancel).await,
        WaitFor::None => Ok(()),
    };

    match result {
        Ok(()) => {
            println!(
                "{} {} reached {}",
                "✓".green(),
                job.name().bold(),
                describe(wait_for).green()
            );
            Ok(())
        }
        Err(err) => {
            println!("{} {}", "✗".red(), err.to_string().red());
            print_snapshot(&err);
            Err(err.into())
        }
    }
}

/// Cancels the token on Ctrl-C or when the deadline passes
///
/// The returned guard stops the handler when dropped.
fn spawn_interrupt_handler(
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> tokio_util::sync::DropGuard {
    let stop = CancellationToken::new();
    let guard = stop.clone().drop_guard();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, abandoning watch"),
            _ = deadline => warn!("Timed out after {:?}, abandoning watch", timeout.unwrap_or_default()),
        }
        cancel.cancel();
    });

    guard
}

fn describe(wait_for: WaitFor) -> &'static str {
    match wait_for {
        WaitFor::None => "submission",
        WaitFor::Startup => "startup",
        WaitFor::Completion => "completion",
    }
}

fn print_snapshot(err: &JobError) {
    let Some(event) = err.snapshot() else {
        return;
    };

    println!(
        "  Last event: {} / {} at {}",
        event.kind,
        event.phase,
        event.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(code) = event.exit_code {
        println!("  Exit code: {}", code);
    }
    if let Ok(pretty) = serde_json::to_string_pretty(&event.snapshot) {
        println!("{}", "─".repeat(80).dimmed());
        println!("{}", pretty.dimmed());
        println!("{}", "─".repeat(80).dimmed());
    }
}
