//! Daemon assembly: shared state, background loops and the interpreter.
//!
//! The ephemeris, servo and radio-bridge loops each run on their own thread
//! and stop on a flag that is separate from the interpreter's `quit` flag, so
//! the final stow after `quit` still has a live servo loop behind it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ephemeris::{EphemerisTracker, Observer};
use hardware::{Rotor, RotorError};
use thiserror::Error;
use tracing::{info, warn};

use crate::calibration::Calibration;
use crate::config::{ConfigDirectory, ConfigError, Settings};
use crate::interpreter::{Interpreter, InterpreterConfig};
use crate::queue::{CommandQueue, CommandSender};
use crate::radio::{radio_channel, RadioBridge, RadioControl, RadioSender, XmlRpcRadio};
use crate::servo::{ServoLoop, ServoTiming};
use crate::spectrum::{SpectrumSource, TcpSpectrumSource};
use crate::state::{DaemonState, RadioSettings};
use crate::status::StationInfo;
use crate::tasks::{ProcessLauncher, TaskLauncher};
use crate::tracking::{EphemerisLoop, EphemerisSource, TrackerSource};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rotor error: {0}")]
    Rotor(#[from] RotorError),

    #[error("Failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Cadence of every loop in the daemon.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub servo: ServoTiming,
    /// Interpreter poll while waiting for the rotor to arrive
    pub arrival_poll: Duration,
    pub arrival_timeout: Option<Duration>,
    pub ephemeris_poll: Duration,
    pub queue_poll: Duration,
    pub beam_switch_dwell: Duration,
    pub radio_spacing: Duration,
    pub status_interval: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            servo: ServoTiming::default(),
            arrival_poll: Duration::from_millis(100),
            arrival_timeout: None,
            ephemeris_poll: Duration::from_secs(1),
            queue_poll: Duration::from_millis(250),
            beam_switch_dwell: Duration::from_secs(5),
            radio_spacing: Duration::from_millis(100),
            status_interval: Duration::from_millis(500),
        }
    }
}

/// The collaborators a daemon talks to.
pub struct DaemonParts {
    pub settings: Settings,
    pub calibration_path: PathBuf,
    pub calibration: Calibration,
    pub rotor: Rotor,
    pub ephemeris: Arc<dyn EphemerisSource>,
    pub radio: Box<dyn RadioControl>,
    pub spectrum: Box<dyn SpectrumSource>,
    pub tasks: Box<dyn TaskLauncher>,
}

impl DaemonParts {
    /// Real hardware and processes as described by a configuration directory.
    pub fn from_config_directory(config: &ConfigDirectory) -> Result<Self, DaemonError> {
        let settings = config.load_settings()?;
        let catalog = config.load_catalog()?;
        let calibration = load_calibration(config, &settings);

        let observer = Observer::new(settings.station.latitude, settings.station.longitude);
        let ephemeris = Arc::new(TrackerSource::new(EphemerisTracker::new(observer, catalog)));
        let rotor = Rotor::open(
            settings.motor()?,
            &settings.motor_port,
            settings.motor_baudrate,
            settings.limits(),
        )?;
        let radio = Box::new(XmlRpcRadio::new(settings.radio_rpc_url.clone()));
        let spectrum = Box::new(TcpSpectrumSource::new(
            settings.spectrum_address.clone(),
            settings.radio_num_bins,
        ));
        let tasks = Box::new(ProcessLauncher::new(
            settings.radio_tasks.clone(),
            settings.save_directory.clone(),
            config.root_path().to_path_buf(),
        ));

        Ok(Self {
            calibration_path: config.calibration_path(),
            calibration,
            rotor,
            ephemeris,
            radio,
            spectrum,
            tasks,
            settings,
        })
    }
}

/// Stored calibration, or flat gains when there is none usable.
fn load_calibration(config: &ConfigDirectory, settings: &Settings) -> Calibration {
    let uncalibrated = || Calibration::uncalibrated(settings.radio_num_bins, settings.tsys, settings.tcal);
    match config.get_calibration() {
        None => {
            info!("No calibration stored, using flat gains");
            uncalibrated()
        }
        Some(Ok(calibration)) => match calibration.check_size(settings.radio_num_bins) {
            Ok(calibration) => calibration,
            Err(e) => {
                warn!("Ignoring stored calibration: {}", e);
                uncalibrated()
            }
        },
        Some(Err(e)) => {
            warn!("Ignoring stored calibration: {}", e);
            uncalibrated()
        }
    }
}

pub struct Daemon {
    state: Arc<DaemonState>,
    interpreter: Interpreter,
    commands: CommandSender,
    info: StationInfo,
    loops_running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

fn spawn_loop(name: &'static str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>, DaemonError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| DaemonError::Thread { name, source })
}

/// Send the full parameter set so the radio starts from known values.
fn push_initial_radio_settings(
    radio: &RadioSender,
    state: &DaemonState,
    ephemeris: &dyn EphemerisSource,
) {
    let settings = state.radio.get();
    let position = state.rotor_location.get();
    let galactic = ephemeris.to_galactic(position);
    radio.push("freq", settings.tuned_frequency());
    radio.push("samp_rate", settings.sample_rate);
    radio.push("motor_az", position.az);
    radio.push("motor_el", position.el);
    radio.push("glat", galactic.b);
    radio.push("glon", galactic.l);
    radio.push("soutrack", "at_stow");
    radio.push("tsys", settings.tsys);
    radio.push("tcal", settings.tcal);
    radio.push("cal_pwr", settings.cal_power);
    radio.push("cal_values", settings.cal_values.as_ref().clone());
    radio.push("is_running", true);
}

impl Daemon {
    /// Build shared state and start the background loops.
    pub fn start(parts: DaemonParts, timing: LoopTiming) -> Result<Self, DaemonError> {
        let DaemonParts {
            settings,
            calibration_path,
            calibration,
            rotor,
            ephemeris,
            radio,
            spectrum,
            mut tasks,
        } = parts;

        let radio_settings = RadioSettings {
            center_frequency: settings.radio_cf,
            frequency_correction: settings.radio_freq_corr,
            sample_rate: settings.radio_sf,
            num_bins: settings.radio_num_bins,
            integ_cycles: settings.radio_integ_cycles,
            tsys: settings.tsys,
            tcal: settings.tcal,
            cal_power: calibration.cal_pwr,
            cal_values: Arc::new(calibration.cal_values),
        };
        let state = Arc::new(DaemonState::new(settings.stow(), radio_settings));
        let loops_running = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::new();

        let (radio_tx, radio_rx) = radio_channel();
        info!("Sending initial radio settings");
        push_initial_radio_settings(&radio_tx, &state, ephemeris.as_ref());
        let bridge = RadioBridge::new(radio_rx, radio).with_spacing(timing.radio_spacing);
        threads.push(spawn_loop("radio-bridge", {
            let state = state.clone();
            let running = loops_running.clone();
            move || bridge.run(&running, &state.error_log)
        })?);

        let ephemeris_loop = EphemerisLoop::new(
            state.clone(),
            ephemeris.clone(),
            settings.limits(),
            timing.ephemeris_poll,
        );
        threads.push(spawn_loop("ephemeris", {
            let running = loops_running.clone();
            move || ephemeris_loop.run(&running)
        })?);

        let servo = ServoLoop::new(
            rotor,
            state.clone(),
            radio_tx.clone(),
            ephemeris.clone(),
            settings.arrival_tolerance,
            timing.servo,
        );
        threads.push(spawn_loop("servo", {
            let running = loops_running.clone();
            move || servo.run(&running)
        })?);

        let radio_process = if settings.radio_autostart {
            match tasks.start_radio(&state.radio.get()) {
                Ok(task) => Some(task),
                Err(e) => {
                    state.error_log.push(format!("Radio process failed to start: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let queue = CommandQueue::new();
        let commands = queue.sender();
        let config = InterpreterConfig::from_settings(&settings, calibration_path, &timing);
        let mut interpreter = Interpreter::new(
            config,
            state.clone(),
            queue,
            radio_tx,
            ephemeris,
            spectrum,
            tasks,
        );
        if let Some(task) = radio_process {
            interpreter.set_radio_process(task);
        }

        info!("Daemon started with {} motor", settings.motor_type);
        Ok(Self {
            state,
            interpreter,
            commands,
            info: StationInfo::from_settings(&settings),
            loops_running,
            threads,
        })
    }

    pub fn state(&self) -> Arc<DaemonState> {
        self.state.clone()
    }

    /// Handle for enqueueing commands from any thread.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn station_info(&self) -> &StationInfo {
        &self.info
    }

    /// Run commands until `quit`, then stop every loop.
    pub fn run(mut self) {
        self.interpreter.run();
        self.loops_running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("loop").to_string();
            if handle.join().is_err() {
                warn!("{} thread panicked", name);
            }
        }
        info!("Daemon stopped");
    }
}
