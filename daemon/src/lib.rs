//! Control daemon for a small radio telescope.
//!
//! One process owns the antenna. Background loops keep object positions
//! fresh, drive the rotor toward the commanded angle and forward radio
//! parameter changes, while a single [`Interpreter`] consumes operator
//! commands in order. Shared state lives in [`DaemonState`]; every field is
//! replaced whole by its one writer, so readers never see a half-applied
//! update.

pub mod calibration;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod interpreter;
pub mod queue;
pub mod radio;
pub mod scan;
pub mod server;
pub mod servo;
pub mod spectrum;
pub mod state;
pub mod status;
pub mod tasks;
pub mod tracking;
pub mod wait;

pub use calibration::{Calibration, CalibrationError};
pub use command::{Command, CommandError};
pub use config::{ConfigDirectory, ConfigError, Settings};
pub use coordinator::{Daemon, DaemonError, DaemonParts, LoopTiming};
pub use interpreter::{Interpreter, InterpreterConfig, InterpreterError};
pub use queue::{CommandQueue, CommandSender};
pub use radio::{RadioControl, RadioError, RadioValue, XmlRpcRadio};
pub use spectrum::{SpectrumError, SpectrumSource, TcpSpectrumSource};
pub use state::{DaemonState, Pointing, RadioSettings};
pub use status::{StatusBroadcaster, StatusSnapshot};
pub use tasks::{RecordingKind, RunningTask, TaskError, TaskLauncher};
pub use tracking::{EphemerisSource, TrackerSource};
