//! Send commands to a running srt_daemon.

use std::io::{self, BufRead, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "srt_command")]
#[command(about = "Queue a command on a running srt_daemon")]
#[command(version)]
struct Args {
    /// Daemon host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Daemon command port
    #[arg(short, long, default_value = "5556")]
    port: u16,

    /// Command words, e.g. `azel 120 45`. Read from stdin, one per line, if omitted
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let commands: Vec<String> = if args.command.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<_>>()
            .context("Failed to read commands from stdin")?
    } else {
        vec![args.command.join(" ")]
    };
    let commands: Vec<&str> = commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if commands.is_empty() {
        bail!("No command given");
    }

    let mut stream = TcpStream::connect((args.host.as_str(), args.port))
        .with_context(|| format!("Failed to connect to {}:{}", args.host, args.port))?;
    for command in commands {
        writeln!(stream, "{command}")?;
        tracing::info!("Sent '{}'", command);
    }
    stream.flush()?;
    Ok(())
}
