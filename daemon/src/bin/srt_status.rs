//! Fetch and print the status of a running srt_daemon.

use anyhow::{Context, Result};
use clap::Parser;
use srt_daemon::state::unix_time;
use srt_daemon::StatusSnapshot;

#[derive(Parser, Debug)]
#[command(name = "srt_status")]
#[command(about = "Print the status of a running srt_daemon")]
#[command(version)]
struct Args {
    /// Daemon host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Daemon status port
    #[arg(short, long, default_value = "5555")]
    port: u16,

    /// Print the raw JSON snapshot
    #[arg(long)]
    json: bool,
}

fn print_summary(status: &StatusSnapshot) {
    println!("Motor:      {} -> {}", status.motor_azel, status.motor_cmd_azel);
    println!("Offsets:    {}", status.motor_offsets);
    match &status.tracking {
        Some(name) => println!("Tracking:   {name} (vlsr {:.2} km/s)", status.vlsr),
        None => println!("Tracking:   nothing"),
    }
    println!(
        "Radio:      {:.4} MHz, {:.3} MHz bandwidth",
        status.center_frequency / 1e6,
        status.bandwidth / 1e6
    );
    println!("Command:    {} ({} queued)", status.queued_item, status.queue_size);
    if let Some(task) = &status.radio_save_task {
        println!("Recording:  {task}");
    }
    println!("Errors:     {}", status.error_logs.len());
    for entry in status.error_logs.iter().rev().take(5) {
        println!("  {:.0}  {}", entry.time, entry.message);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let endpoint = format!("http://{}:{}/status", args.host, args.port);
    let body = ureq::get(&endpoint)
        .call()
        .with_context(|| format!("Failed to fetch {endpoint}"))?
        .body_mut()
        .read_to_string()?;
    let status: StatusSnapshot = serde_json::from_str(&body).context("Malformed status")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_summary(&status);
    }

    let age = status.age(unix_time());
    if status.is_stale(unix_time()) {
        println!("Daemon looks offline: last status {age:.1} s old");
    }
    Ok(())
}
