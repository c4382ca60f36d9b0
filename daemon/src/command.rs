//! Operator command grammar.
//!
//! Commands are whitespace-delimited; the verb is case-insensitive but object
//! names are matched exactly.
//!
//! | Input | Command |
//! |---|---|
//! | `<object>` / `<object> n` / `<object> b` | track / N-point scan / beam switch |
//! | `stow`, `cal`, `calibrate`, `quit`, `roff` | fixed verbs |
//! | `record [file]` | start a recording |
//! | `freq <MHz>`, `samp <MHz>` | radio tuning |
//! | `azel <az> <el>`, `offset <daz> <del>` | pointing |
//! | `<seconds>`, `wait <seconds>` | delay |
//! | `lst:HH:MM:SS` | wait for the next occurrence of a UTC time of day |
//! | `YYYY:DOY:HH:MM:SS` | wait for an absolute UTC time |
//! | `playsound <text>` | speak text |
//!
//! Inputs shorter than two characters or starting with `*` are ignored, and a
//! leading `:` is stripped.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use hardware::AzEl;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Too few tokens for the verb.
    #[error("{verb} requires argument {index}")]
    MissingArgument { verb: String, index: usize },

    #[error("Cannot parse {value:?} as a number")]
    InvalidNumber { value: String },

    #[error("Cannot parse {value:?} as a time")]
    InvalidTime { value: String },

    #[error("Cannot wait a negative time ({0} s)")]
    NegativeDelay(f64),

    #[error("Cannot wait {0:e} s")]
    DelayTooLong(f64),

    #[error("Time {0} has already passed")]
    TimeInPast(DateTime<Utc>),
}

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Comment, heartbeat or blank line
    Ignored,
    Track { object: String },
    NPointScan { object: String },
    BeamSwitch { object: String },
    Stow,
    Cal,
    Calibrate,
    Quit,
    Record { file_name: Option<String> },
    RecordOff,
    /// Center frequency in Hz
    Freq { hz: f64 },
    /// Sample rate in Hz
    Samp { hz: f64 },
    AzEl { target: AzEl },
    Offset { offset: AzEl },
    Sleep { duration: Duration },
    WaitUntil { at: DateTime<Utc> },
    PlaySound { text: String },
    /// Anything the grammar does not recognise
    Unknown { text: String },
}

fn argument<'a>(tokens: &[&'a str], index: usize) -> Result<&'a str, CommandError> {
    tokens
        .get(index)
        .copied()
        .ok_or_else(|| CommandError::MissingArgument {
            verb: tokens[0].to_lowercase(),
            index,
        })
}

fn number(value: &str) -> Result<f64, CommandError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandError::InvalidNumber {
            value: value.to_string(),
        })
}

fn delay(seconds: f64) -> Result<Command, CommandError> {
    if seconds < 0.0 {
        return Err(CommandError::NegativeDelay(seconds));
    }
    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|_| CommandError::DelayTooLong(seconds))?;
    Ok(Command::Sleep { duration })
}

fn invalid_time(value: &str) -> CommandError {
    CommandError::InvalidTime {
        value: value.to_string(),
    }
}

/// Next occurrence of a UTC time of day strictly after `now`.
fn next_time_of_day(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CommandError> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S").map_err(|_| invalid_time(text))?;
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        Ok(today)
    } else {
        Ok(today + ChronoDuration::days(1))
    }
}

/// `YYYY:DOY:HH:MM:SS` as a UTC instant.
fn absolute_time(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CommandError> {
    let fields: Vec<u32> = text
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| invalid_time(text))?;
    let [year, doy, hour, minute, second] = fields[..] else {
        return Err(invalid_time(text));
    };
    let year = i32::try_from(year).map_err(|_| invalid_time(text))?;
    let at = NaiveDate::from_yo_opt(year, doy)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| invalid_time(text))?
        .and_utc();
    if at <= now {
        return Err(CommandError::TimeInPast(at));
    }
    Ok(at)
}

/// Parse one command line.
///
/// `is_object` decides whether the first token names a known ephemeris
/// object; `now` anchors the time-based waits.
pub fn parse(
    input: &str,
    is_object: impl Fn(&str) -> bool,
    now: DateTime<Utc>,
) -> Result<Command, CommandError> {
    if input.chars().count() < 2 || input.starts_with('*') {
        return Ok(Command::Ignored);
    }
    let text = input.strip_prefix(':').unwrap_or(input).trim();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return Ok(Command::Ignored);
    };

    if is_object(first) {
        let object = first.to_string();
        return Ok(match tokens.last() {
            Some(&"n") if tokens.len() > 1 => Command::NPointScan { object },
            Some(&"b") if tokens.len() > 1 => Command::BeamSwitch { object },
            _ => Command::Track { object },
        });
    }

    let verb = first.to_lowercase();
    let command = match verb.as_str() {
        "stow" => Command::Stow,
        "cal" => Command::Cal,
        "calibrate" => Command::Calibrate,
        "quit" => Command::Quit,
        "roff" => Command::RecordOff,
        "record" => Command::Record {
            file_name: tokens.get(1).map(|s| s.to_string()),
        },
        "freq" => Command::Freq {
            hz: number(argument(&tokens, 1)?)? * 1e6,
        },
        "samp" => Command::Samp {
            hz: number(argument(&tokens, 1)?)? * 1e6,
        },
        "azel" => Command::AzEl {
            target: AzEl::new(
                number(argument(&tokens, 1)?)?,
                number(argument(&tokens, 2)?)?,
            ),
        },
        "offset" => Command::Offset {
            offset: AzEl::new(
                number(argument(&tokens, 1)?)?,
                number(argument(&tokens, 2)?)?,
            ),
        },
        "wait" => delay(number(argument(&tokens, 1)?)?)?,
        "playsound" => Command::PlaySound {
            text: tokens[1..].join(" "),
        },
        _ => {
            if let Ok(seconds) = number(&verb) {
                delay(seconds)?
            } else if let Some(time) = verb.strip_prefix("lst:") {
                Command::WaitUntil {
                    at: next_time_of_day(time, now)?,
                }
            } else if verb.split(':').count() == 5 {
                Command::WaitUntil {
                    at: absolute_time(&verb, now)?,
                }
            } else {
                Command::Unknown {
                    text: text.to_string(),
                }
            }
        }
    };
    Ok(command)
}
