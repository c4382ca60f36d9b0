//! External radio processes: the signal chain, recorders, calibration and
//! speech.
//!
//! Each task is launched from an argument-vector prefix in the settings file
//! with the daemon's own flags appended, e.g.
//!
//! ```text
//! srt_radio_save_spectrum_rad --file /data/obs.rad --num-bins 256 --sample-rate 2400000
//! ```

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RadioTaskCommands;
use crate::state::RadioSettings;
use crate::wait::await_condition;

/// How long `calibrate` may run before it is killed.
pub const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("No command configured for the {0} task")]
    NotConfigured(&'static str),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("Task IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a `record` command saves, chosen by file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingKind {
    /// Raw samples into a directory
    Raw { directory: String },
    /// Integrated spectra in `.rad` text format
    SpectrumRad { file_name: String },
    /// Integrated spectra as FITS
    SpectrumFits { file_name: String },
}

impl RecordingKind {
    pub fn from_name(name: Option<&str>, now: DateTime<Utc>) -> Self {
        match name {
            None => Self::Raw {
                directory: now.format("SRT_RAW_SAVE-%Y:%m:%d:%H:%M:%S").to_string(),
            },
            Some(name) if name.ends_with(".rad") => Self::SpectrumRad {
                file_name: name.to_string(),
            },
            Some(name) if name.ends_with(".fits") => Self::SpectrumFits {
                file_name: name.to_string(),
            },
            Some(name) => Self::Raw {
                directory: name.to_string(),
            },
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Raw { .. } => "raw recording",
            Self::SpectrumRad { .. } => "rad recording",
            Self::SpectrumFits { .. } => "fits recording",
        }
    }

    fn target(&self) -> &str {
        match self {
            Self::Raw { directory } => directory,
            Self::SpectrumRad { file_name } | Self::SpectrumFits { file_name } => file_name,
        }
    }
}

/// A background process the daemon may need to stop.
pub trait RunningTask: Send {
    fn describe(&self) -> &str;

    fn terminate(&mut self) -> Result<(), TaskError>;
}

/// Launches the external radio processes.
pub trait TaskLauncher: Send {
    /// Start the signal-processing chain.
    fn start_radio(&mut self, radio: &RadioSettings) -> Result<Box<dyn RunningTask>, TaskError>;

    fn start_recording(
        &mut self,
        kind: &RecordingKind,
        radio: &RadioSettings,
    ) -> Result<Box<dyn RunningTask>, TaskError>;

    /// Run calibration to completion. It writes `calibration.json` itself.
    fn calibrate(&mut self, radio: &RadioSettings, timeout: Duration) -> Result<(), TaskError>;

    fn speak(&mut self, text: &str) -> Result<(), TaskError>;
}

/// A spawned child process.
pub struct ChildTask {
    description: String,
    child: Child,
}

impl RunningTask for ChildTask {
    fn describe(&self) -> &str {
        &self.description
    }

    fn terminate(&mut self) -> Result<(), TaskError> {
        if self.child.try_wait()?.is_none() {
            info!("Stopping {}", self.description);
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for ChildTask {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!("{} still running at drop, killing it", self.description);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Runs tasks as child processes.
pub struct ProcessLauncher {
    commands: RadioTaskCommands,
    save_directory: PathBuf,
    config_directory: PathBuf,
}

impl ProcessLauncher {
    pub fn new(commands: RadioTaskCommands, save_directory: PathBuf, config_directory: PathBuf) -> Self {
        Self {
            commands,
            save_directory,
            config_directory,
        }
    }

    fn command(prefix: &[String], task: &'static str, args: &[String]) -> Result<(Command, String), TaskError> {
        let (program, fixed) = prefix.split_first().ok_or(TaskError::NotConfigured(task))?;
        let mut command = Command::new(program);
        command.args(fixed).args(args);
        Ok((command, program.clone()))
    }

    fn spawn(prefix: &[String], task: &'static str, args: &[String]) -> Result<(Child, String), TaskError> {
        let (mut command, program) = Self::command(prefix, task, args)?;
        info!("Starting {}: {} {}", task, program, args.join(" "));
        let child = command.spawn().map_err(|source| TaskError::Spawn {
            program: program.clone(),
            source,
        })?;
        Ok((child, program))
    }

    fn save_path(&self, name: &str) -> String {
        path_string(&self.save_directory.join(name))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn flag(name: &str, value: impl ToString) -> [String; 2] {
    [format!("--{name}"), value.to_string()]
}

impl TaskLauncher for ProcessLauncher {
    fn start_radio(&mut self, radio: &RadioSettings) -> Result<Box<dyn RunningTask>, TaskError> {
        let args = [
            flag("num-bins", radio.num_bins),
            flag("num-integrations", radio.integ_cycles),
        ]
        .concat();
        let (child, _) = Self::spawn(&self.commands.process, "radio", &args)?;
        Ok(Box::new(ChildTask {
            description: "radio process".to_string(),
            child,
        }))
    }

    fn start_recording(
        &mut self,
        kind: &RecordingKind,
        radio: &RadioSettings,
    ) -> Result<Box<dyn RunningTask>, TaskError> {
        let target = self.save_path(kind.target());
        let (prefix, args) = match kind {
            RecordingKind::Raw { .. } => (
                &self.commands.save_raw,
                [flag("directory", &target), flag("sample-rate", radio.sample_rate)].concat(),
            ),
            RecordingKind::SpectrumRad { .. } => (
                &self.commands.save_rad,
                [
                    flag("file", &target),
                    flag("num-bins", radio.num_bins),
                    flag("sample-rate", radio.sample_rate),
                ]
                .concat(),
            ),
            RecordingKind::SpectrumFits { .. } => (
                &self.commands.save_fits,
                [
                    flag("file", &target),
                    flag("num-bins", radio.num_bins),
                    flag("sample-rate", radio.sample_rate),
                ]
                .concat(),
            ),
        };
        let (child, _) = Self::spawn(prefix, kind.label(), &args)?;
        Ok(Box::new(ChildTask {
            description: format!("{} to {}", kind.label(), target),
            child,
        }))
    }

    fn calibrate(&mut self, radio: &RadioSettings, timeout: Duration) -> Result<(), TaskError> {
        let args = [
            flag("directory", path_string(&self.config_directory)),
            flag("num-bins", radio.num_bins),
            flag("num-integrations", radio.integ_cycles),
        ]
        .concat();
        let (mut child, program) = Self::spawn(&self.commands.calibrate, "calibration", &args)?;

        let mut status = None;
        await_condition(
            || {
                status = child.try_wait().ok().flatten();
                status.is_some()
            },
            Duration::from_millis(100),
            Some(timeout),
        );
        match status {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(TaskError::Failed { program, status }),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(TaskError::Timeout {
                    program,
                    after: timeout,
                })
            }
        }
    }

    fn speak(&mut self, text: &str) -> Result<(), TaskError> {
        let (mut command, program) = Self::command(&self.commands.speech, "speech", &[text.to_string()])?;
        let status = command.status().map_err(|source| TaskError::Spawn {
            program: program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(TaskError::Failed { program, status });
        }
        Ok(())
    }
}
