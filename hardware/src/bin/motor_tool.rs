//! Bench tool for antenna rotor mounts.
//!
//! Subcommands:
//! - `status`: Print the current mount position
//! - `point`: Command a position and poll until the mount settles
//! - `stop`: Halt motion
//! - `repl`: Interactive prompt (`point <az> <el>`, `status`, `stop`, `quit`)
//!
//! All motion goes through the same limit checks the daemon uses.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::{
    azel_within_range, AngleLimits, ArrivalTolerance, AzEl, AzElLimits, MotorType, Rotor,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;

/// Antenna rotor bench tool
#[derive(Parser, Debug)]
#[command(name = "motor_tool")]
#[command(about = "Command and query a radio telescope rotor mount")]
#[command(version)]
struct Args {
    /// Mount type (NONE, ALFASPID, H180MOUNT, CASSI)
    #[arg(long, global = true, default_value = "NONE")]
    motor_type: MotorType,

    /// Serial device
    #[arg(long, global = true, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(long, global = true, default_value = "600")]
    baudrate: u32,

    /// Azimuth limits as "lower,upper"
    #[arg(long, global = true, default_value = "0,360", value_parser = parse_limits)]
    az_limits: AngleLimits,

    /// Elevation limits as "lower,upper"
    #[arg(long, global = true, default_value = "0,90", value_parser = parse_limits)]
    el_limits: AngleLimits,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current position
    Status,

    /// Point at an azimuth/elevation and wait for arrival
    Point {
        /// Azimuth in degrees
        az: f64,

        /// Elevation in degrees
        el: f64,

        /// Give up waiting after this many seconds
        #[arg(short, long, default_value = "60")]
        timeout: f64,

        /// Return immediately after sending the command
        #[arg(long)]
        no_wait: bool,
    },

    /// Halt motion
    Stop,

    /// Interactive command prompt
    Repl,
}

fn parse_limits(s: &str) -> Result<AngleLimits, String> {
    let (lower, upper) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lower,upper\", got {s:?}"))?;
    let lower: f64 = lower.trim().parse().map_err(|e| format!("{e}"))?;
    let upper: f64 = upper.trim().parse().map_err(|e| format!("{e}"))?;
    Ok(AngleLimits::new(lower, upper))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let limits = AzElLimits::new(args.az_limits, args.el_limits);
    let mut rotor = Rotor::open(args.motor_type, &args.port, args.baudrate, limits)
        .with_context(|| format!("opening {} on {}", args.motor_type, args.port))?;

    match args.command {
        Command::Status => cmd_status(&mut rotor),
        Command::Point {
            az,
            el,
            timeout,
            no_wait,
        } => cmd_point(&mut rotor, AzEl::new(az, el), timeout, no_wait),
        Command::Stop => {
            rotor.stop()?;
            info!("Stop sent");
            Ok(())
        }
        Command::Repl => cmd_repl(&mut rotor),
    }
}

// ==================== Status / Point ====================

fn cmd_status(rotor: &mut Rotor) -> Result<()> {
    let position = rotor.get_azimuth_elevation()?;
    println!("az={:.2} el={:.2}", position.az, position.el);
    Ok(())
}

fn cmd_point(rotor: &mut Rotor, target: AzEl, timeout_s: f64, no_wait: bool) -> Result<()> {
    info!("Pointing at {}", target);
    rotor.set_azimuth_elevation(target)?;
    if no_wait {
        return Ok(());
    }

    let tolerance = ArrivalTolerance::default();
    let deadline = Instant::now() + Duration::from_secs_f64(timeout_s);
    loop {
        let position = rotor.get_azimuth_elevation()?;
        if azel_within_range(position, target, tolerance) {
            info!("Arrived at {}", position);
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("Mount at {} did not reach {} within {}s", position, target, timeout_s);
        }
        // Counting mounts clamp each move, so keep re-issuing the target.
        rotor.set_azimuth_elevation(target)?;
        thread::sleep(Duration::from_millis(500));
    }
}

// ==================== REPL ====================

fn cmd_repl(rotor: &mut Rotor) -> Result<()> {
    println!("Rotor REPL - point <az> <el>, status, stop, quit");
    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline("rotor> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        let parts: Vec<&str> = line.split_whitespace().collect();
        let result = match parts.as_slice() {
            ["quit"] | ["exit"] => break,
            ["status"] => cmd_status(rotor),
            ["stop"] => rotor.stop().map_err(Into::into),
            ["point", az, el] => match (az.parse(), el.parse()) {
                (Ok(az), Ok(el)) => rotor
                    .set_azimuth_elevation(AzEl::new(az, el))
                    .map_err(Into::into),
                _ => Err(anyhow::anyhow!("point needs two numbers")),
            },
            _ => Err(anyhow::anyhow!("unknown command {line:?}")),
        };
        match result {
            Ok(()) => println!("OK"),
            Err(e) => println!("Error: {e}"),
        }
    }

    Ok(())
}
