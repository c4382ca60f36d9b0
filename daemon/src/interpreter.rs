//! The command interpreter.
//!
//! A single thread takes commands off the [`CommandQueue`] one at a time and
//! applies each to the shared [`DaemonState`]. Pointing commands block until
//! the servo loop reports arrival. A command that fails is written to the
//! error log and the loop moves on; nothing short of `quit` ends the loop.
//!
//! # Rejections
//!
//! A pointing command whose target is outside the limits changes nothing:
//! no state is written and nothing is sent to the radio.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::RecvTimeoutError;
use hardware::{azel_within_range, ArrivalTolerance, AzEl, AzElLimits};
use thiserror::Error;
use tracing::{info, warn};

use crate::calibration::{Calibration, CalibrationError};
use crate::command::{self, Command, CommandError};
use crate::config::Settings;
use crate::coordinator::LoopTiming;
use crate::queue::CommandQueue;
use crate::radio::RadioSender;
use crate::scan::{
    beam_switch_offset, grid_side, is_perfect_square, mean_position, npoint_offset,
    BeamSwitchData, NPointData,
};
use crate::spectrum::{calibrated_power, SpectrumError, SpectrumSource};
use crate::state::{DaemonState, Pointing, RadioSettings, IDLE_COMMAND};
use crate::tasks::{RecordingKind, RunningTask, TaskError, TaskLauncher, CALIBRATION_TIMEOUT};
use crate::tracking::EphemerisSource;
use crate::wait::await_condition;

/// Errors from a single command. Each becomes one error-log entry.
#[derive(Error, Debug)]
pub enum InterpreterError {
    #[error("Cannot run {input:?}: {source}")]
    Command {
        input: String,
        source: CommandError,
    },

    /// Target outside the motor limits.
    #[error("{0} Not in Motor Bounds")]
    OutOfBounds(String),

    #[error("Offset {0} Out of Bounds")]
    OffsetOutOfBounds(AzEl),

    #[error("Object {0} has no ephemeris position")]
    UnknownObject(String),

    #[error("Cannot Start Recording - Already Recording")]
    AlreadyRecording,

    #[error("Command Not Identified '{0}'")]
    NotIdentified(String),

    #[error("Spectrum unavailable: {0}")]
    Spectrum(#[from] SpectrumError),

    #[error("Task failed: {0}")]
    Task(#[from] TaskError),

    #[error("Calibration reload failed: {0}")]
    Calibration(#[from] CalibrationError),
}

pub type InterpreterResult<T> = Result<T, InterpreterError>;

/// Fixed parameters of the interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub limits: AzElLimits,
    pub stow: AzEl,
    pub cal: AzEl,
    pub tolerance: ArrivalTolerance,
    /// Degrees
    pub beamwidth: f64,
    pub n_pnt_count: usize,
    pub num_beamswitches: usize,
    pub npoint_dwell: Duration,
    pub beam_switch_dwell: Duration,
    pub play_sounds: bool,
    pub calibration_path: PathBuf,
    pub arrival_poll: Duration,
    /// None waits for arrival indefinitely
    pub arrival_timeout: Option<Duration>,
    pub queue_poll: Duration,
}

impl InterpreterConfig {
    pub fn from_settings(settings: &Settings, calibration_path: PathBuf, timing: &LoopTiming) -> Self {
        Self {
            limits: settings.limits(),
            stow: settings.stow(),
            cal: settings.cal(),
            tolerance: settings.arrival_tolerance,
            beamwidth: settings.beamwidth,
            n_pnt_count: settings.n_pnt_count,
            num_beamswitches: settings.num_beamswitches,
            npoint_dwell: Duration::from_secs_f64(settings.npoint_integ_time.max(0.0)),
            beam_switch_dwell: timing.beam_switch_dwell,
            play_sounds: settings.play_sounds,
            calibration_path,
            arrival_poll: timing.arrival_poll,
            arrival_timeout: timing.arrival_timeout,
            queue_poll: timing.queue_poll,
        }
    }
}

pub struct Interpreter {
    config: InterpreterConfig,
    state: Arc<DaemonState>,
    queue: CommandQueue,
    radio: RadioSender,
    ephemeris: Arc<dyn EphemerisSource>,
    spectrum: Box<dyn SpectrumSource>,
    tasks: Box<dyn TaskLauncher>,
    recording: Option<Box<dyn RunningTask>>,
    radio_process: Option<Box<dyn RunningTask>>,
}

impl Interpreter {
    pub fn new(
        config: InterpreterConfig,
        state: Arc<DaemonState>,
        queue: CommandQueue,
        radio: RadioSender,
        ephemeris: Arc<dyn EphemerisSource>,
        spectrum: Box<dyn SpectrumSource>,
        tasks: Box<dyn TaskLauncher>,
    ) -> Self {
        Self {
            config,
            state,
            queue,
            radio,
            ephemeris,
            spectrum,
            tasks,
            recording: None,
            radio_process: None,
        }
    }

    /// Hand over the radio process so it is stopped after the final stow.
    pub fn set_radio_process(&mut self, task: Box<dyn RunningTask>) {
        self.radio_process = Some(task);
    }

    pub fn tasks(&mut self) -> &mut dyn TaskLauncher {
        self.tasks.as_mut()
    }

    // ==================== Main loop ====================

    /// Execute queued commands until `quit`, then shut down.
    pub fn run(&mut self) {
        info!("Interpreter waiting for commands");
        while self.state.keep_running() {
            match self.queue.recv_timeout(self.config.queue_poll) {
                Ok(input) => self.process(&input),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shutdown();
    }

    /// Parse and execute one command line, logging any failure.
    pub fn process(&mut self, input: &str) {
        self.state.rotor_loc_npoint_live.replace(Vec::new());
        info!("Running Command '{}'", input);
        self.state.current_queue_item.replace(input.to_string());

        let locations = self.state.ephemeris_locations.get();
        let result = command::parse(input, |name| locations.contains_key(name), Utc::now())
            .map_err(|source| InterpreterError::Command {
                input: input.to_string(),
                source,
            })
            .and_then(|command| self.execute(command));
        if let Err(e) = result {
            self.state.error_log.push(e.to_string());
        }
        self.state.current_queue_item.replace(IDLE_COMMAND.to_string());
    }

    pub fn execute(&mut self, command: Command) -> InterpreterResult<()> {
        match command {
            Command::Ignored => Ok(()),
            Command::Track { object } => self.point_at_object(&object),
            Command::NPointScan { object } => self.n_point_scan(&object),
            Command::BeamSwitch { object } => self.beam_switch(&object),
            Command::Stow => {
                self.stow();
                Ok(())
            }
            Command::Cal => self.point_at_azel(self.config.cal),
            Command::Calibrate => self.calibrate(),
            Command::Quit => {
                self.quit();
                Ok(())
            }
            Command::Record { file_name } => self.start_recording(file_name.as_deref()),
            Command::RecordOff => self.stop_recording(),
            Command::Freq { hz } => {
                self.set_frequency(hz);
                Ok(())
            }
            Command::Samp { hz } => self.set_sample_rate(hz),
            Command::AzEl { target } => self.point_at_azel(target),
            Command::Offset { offset } => self.point_at_offset(offset),
            Command::Sleep { duration } => {
                thread::sleep(duration);
                Ok(())
            }
            Command::WaitUntil { at } => {
                // already passed by the time it ran: nothing to wait for
                if let Ok(delay) = (at - Utc::now()).to_std() {
                    info!("Waiting until {}", at);
                    thread::sleep(delay);
                }
                Ok(())
            }
            Command::PlaySound { text } => self.play_sound(&text),
            Command::Unknown { text } => Err(InterpreterError::NotIdentified(text)),
        }
    }

    /// Stop recording, return to stow, then stop the radio process.
    pub fn shutdown(&mut self) {
        info!("Interpreter shutting down");
        if let Err(e) = self.stop_recording() {
            self.state.error_log.push(e.to_string());
        }
        self.stow();
        if let Some(mut radio) = self.radio_process.take() {
            if let Err(e) = radio.terminate() {
                self.state
                    .error_log
                    .push(format!("Failed to stop {}: {e}", radio.describe()));
            }
        }
    }

    // ==================== Pointing ====================

    fn wait_for_arrival(&self) {
        let state = &self.state;
        let tolerance = self.config.tolerance;
        let arrived = await_condition(
            || azel_within_range(state.rotor_location.get(), state.rotor_cmd_location(), tolerance),
            self.config.arrival_poll,
            self.config.arrival_timeout,
        );
        if !arrived {
            warn!(
                "Rotor did not reach {} within {:?}",
                state.rotor_cmd_location(),
                self.config.arrival_timeout
            );
        }
    }

    fn object_location(&self, name: &str) -> InterpreterResult<AzEl> {
        self.state
            .ephemeris_locations
            .get()
            .get(name)
            .copied()
            .ok_or_else(|| InterpreterError::UnknownObject(name.to_string()))
    }

    fn object_vlsr(&self, name: &str) -> f64 {
        self.state
            .ephemeris_vlsr
            .get()
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    fn announce_target(&self, soutrack: &str, vlsr: f64) {
        self.radio.push("soutrack", soutrack);
        self.radio.push("vlsr", vlsr);
        self.state.current_vlsr.replace(vlsr);
    }

    pub fn point_at_object(&mut self, name: &str) -> InterpreterResult<()> {
        let destination = self.object_location(name)?;
        if !self.config.limits.contains(destination) {
            return Err(InterpreterError::OutOfBounds(format!("Object {name}")));
        }
        self.state
            .pointing
            .replace(Pointing::tracking(name, destination));
        self.announce_target(name, self.object_vlsr(name));
        self.wait_for_arrival();
        Ok(())
    }

    pub fn point_at_azel(&mut self, target: AzEl) -> InterpreterResult<()> {
        if !self.config.limits.contains(target) {
            return Err(InterpreterError::OutOfBounds(format!("Object at {target}")));
        }
        self.state.pointing.replace(Pointing::fixed(target));
        let vlsr = self.ephemeris.vlsr_toward(target);
        self.announce_target(&format!("azel_{}_{}", target.az, target.el), vlsr);
        self.wait_for_arrival();
        Ok(())
    }

    /// Apply `offset` on top of the current destination.
    pub fn point_at_offset(&mut self, offset: AzEl) -> InterpreterResult<()> {
        self.retarget(None, offset)
    }

    /// Swap in a new destination and offset together, then wait for arrival.
    /// Nothing is written unless the combined angle is within the limits.
    fn retarget(&mut self, destination: Option<AzEl>, offset: AzEl) -> InterpreterResult<()> {
        let limits = self.config.limits;
        self.state.pointing.try_update(|pointing| {
            let next = match destination {
                Some(destination) => pointing.with_destination(destination),
                None => pointing.clone(),
            }
            .with_offsets(offset);
            if limits.contains(next.commanded()) {
                Ok(next)
            } else {
                Err(InterpreterError::OffsetOutOfBounds(offset))
            }
        })?;
        self.wait_for_arrival();
        Ok(())
    }

    pub fn stow(&mut self) {
        self.state.pointing.replace(Pointing::fixed(self.config.stow));
        self.radio.push("soutrack", "at_stow");
        self.wait_for_arrival();
    }

    // ==================== Scans ====================

    fn sample_power(&mut self) -> InterpreterResult<f64> {
        let spectrum = self.spectrum.latest_spectrum()?;
        let radio = self.state.radio.get();
        Ok(calibrated_power(&spectrum, radio.tsys, radio.tcal, radio.cal_power)?)
    }

    /// Point at `destination` plus `offset`, logging a rejected offset.
    fn visit(&mut self, name: &str, destination: AzEl, offset: AzEl) {
        if !self.config.limits.contains(destination) {
            self.state
                .error_log
                .push(InterpreterError::OutOfBounds(format!("Object {name}")).to_string());
            return;
        }
        if let Err(e) = self.retarget(Some(destination), offset) {
            self.state.error_log.push(e.to_string());
        }
    }

    /// Give control of the destination back to the ephemeris loop.
    fn resume_tracking(&self, name: &str) {
        self.state
            .pointing
            .update(|p| Pointing::tracking(name, p.destination));
    }

    fn begin_scan(&self, name: &str) {
        self.announce_target(name, self.object_vlsr(name));
        self.state.pointing.update(Pointing::without_tracking);
    }

    pub fn n_point_scan(&mut self, name: &str) -> InterpreterResult<()> {
        let count = self.config.n_pnt_count;
        if count < 4 || !is_perfect_square(count) {
            warn!("N-point count {} is not a square grid, results may be unbalanced", count);
        }
        self.object_location(name)?;
        self.begin_scan(name);
        let result = self.run_n_point(name, count);
        self.resume_tracking(name);
        let data = result?;
        self.state.n_point_data.replace(Some(data));
        info!("N-point scan of {} finished", name);
        self.play_sound("N-point scan has finished")
    }

    fn run_n_point(&mut self, name: &str, count: usize) -> InterpreterResult<NPointData> {
        let side = grid_side(count);
        let mut centers = Vec::with_capacity(count);
        let mut rotor_locations = Vec::with_capacity(count);
        let mut powers = Vec::with_capacity(count);
        let mut last_offset = AzEl::default();

        for index in 0..count {
            info!("{} of {} point scan", index + 1, count);
            let center = self.object_location(name)?;
            centers.push(center);
            last_offset = npoint_offset(index, count, self.config.beamwidth, center.el);
            self.visit(name, center, last_offset);

            rotor_locations.push(self.state.rotor_location.get());
            self.state
                .rotor_loc_npoint_live
                .replace(rotor_locations.clone());
            thread::sleep(self.config.npoint_dwell);
            powers.push(self.sample_power()?);
        }

        Ok(NPointData {
            scan_center: mean_position(&centers),
            max_offset: last_offset,
            rotor_locations,
            powers,
            grid: (side, side),
        })
    }

    pub fn beam_switch(&mut self, name: &str) -> InterpreterResult<()> {
        let destination = self.object_location(name)?;
        self.begin_scan(name);
        let result = self.run_beam_switch(name, destination);
        self.radio.push("beam_switch", 0i64);
        self.resume_tracking(name);
        self.state.beam_switch_data.replace(Some(result?));
        Ok(())
    }

    fn run_beam_switch(&mut self, name: &str, destination: AzEl) -> InterpreterResult<BeamSwitchData> {
        let steps = 3 * self.config.num_beamswitches;
        let mut rotor_locations = Vec::with_capacity(steps);
        let mut powers = Vec::with_capacity(steps);

        for step in 0..steps {
            info!("{} of {} beam switch", step + 1, steps);
            self.radio.push("beam_switch", step + 1);
            let offset = beam_switch_offset(step, self.config.beamwidth, destination.el);
            self.visit(name, destination, offset);

            rotor_locations.push(self.state.rotor_location.get());
            self.state
                .rotor_loc_npoint_live
                .replace(rotor_locations.clone());
            thread::sleep(self.config.beam_switch_dwell);
            powers.push(self.sample_power()?);
        }
        Ok(BeamSwitchData {
            rotor_locations,
            powers,
        })
    }

    // ==================== Radio ====================

    pub fn set_frequency(&mut self, hz: f64) {
        self.state.radio.update(|r| RadioSettings {
            center_frequency: hz,
            ..r.clone()
        });
        self.radio.push("freq", self.state.radio.get().tuned_frequency());
    }

    pub fn set_sample_rate(&mut self, hz: f64) -> InterpreterResult<()> {
        self.stop_recording()?;
        self.state.radio.update(|r| RadioSettings {
            sample_rate: hz,
            ..r.clone()
        });
        self.radio.push("samp_rate", hz);
        Ok(())
    }

    pub fn calibrate(&mut self) -> InterpreterResult<()> {
        let radio = self.state.radio.get();
        // let one full integration pass at the calibration position first
        let integration = radio.num_bins as f64 * radio.integ_cycles as f64 / radio.sample_rate;
        thread::sleep(Duration::try_from_secs_f64(integration).unwrap_or_default());

        self.tasks.calibrate(&radio, CALIBRATION_TIMEOUT)?;
        let calibration = Calibration::load(&self.config.calibration_path)?.check_size(radio.num_bins)?;
        self.radio.push("cal_pwr", calibration.cal_pwr);
        self.radio.push("cal_values", calibration.cal_values.clone());
        self.state
            .radio
            .update(|r| r.with_calibration(calibration));
        info!("Calibration Done");
        Ok(())
    }

    pub fn quit(&mut self) {
        info!("Quit requested");
        self.state.request_stop();
        self.radio.push("is_running", false);
    }

    // ==================== Tasks ====================

    pub fn start_recording(&mut self, file_name: Option<&str>) -> InterpreterResult<()> {
        if self.recording.is_some() {
            return Err(InterpreterError::AlreadyRecording);
        }
        let kind = RecordingKind::from_name(file_name, Utc::now());
        let task = self.tasks.start_recording(&kind, &self.state.radio.get())?;
        info!("Started {}", task.describe());
        self.state.recording.replace(Some(task.describe().to_string()));
        self.recording = Some(task);
        Ok(())
    }

    pub fn stop_recording(&mut self) -> InterpreterResult<()> {
        if let Some(mut task) = self.recording.take() {
            self.state.recording.replace(None);
            task.terminate()?;
        }
        Ok(())
    }

    fn play_sound(&mut self, text: &str) -> InterpreterResult<()> {
        if self.config.play_sounds {
            self.tasks.speak(text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queue::CommandSender;
    use crate::radio::{radio_channel, RadioUpdate, RadioValue};
    use crate::servo::{ServoLoop, ServoTiming};
    use crate::state::tests::radio_settings;
    use crate::tasks::tests::ScriptedLauncher;
    use crate::tracking::tests::FixedEphemeris;
    use crossbeam_channel::Receiver;
    use hardware::{AngleLimits, NoMotor, Rotor};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::JoinHandle;

    pub(crate) struct ConstantSpectrum(pub Vec<f32>);

    impl SpectrumSource for ConstantSpectrum {
        fn latest_spectrum(&mut self) -> Result<Vec<f32>, SpectrumError> {
            Ok(self.0.clone())
        }
    }

    const STOW: AzEl = AzEl::new(38.0, 10.0);
    const M31: AzEl = AzEl::new(120.0, 45.0);
    const HIGH: AzEl = AzEl::new(120.0, 79.5);

    fn limits() -> AzElLimits {
        AzElLimits::new(AngleLimits::new(0.0, 360.0), AngleLimits::new(10.0, 80.0))
    }

    struct Harness {
        interpreter: Interpreter,
        state: Arc<DaemonState>,
        radio: Receiver<RadioUpdate>,
        launcher: ScriptedLauncher,
        sender: CommandSender,
        running: Arc<AtomicBool>,
        servo: Option<JoinHandle<()>>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let calibration_path = dir.path().join("calibration.json");
            let config = InterpreterConfig {
                limits: limits(),
                stow: STOW,
                cal: AzEl::new(120.0, 20.0),
                tolerance: ArrivalTolerance::default(),
                beamwidth: 2.0,
                n_pnt_count: 9,
                num_beamswitches: 1,
                npoint_dwell: Duration::from_millis(1),
                beam_switch_dwell: Duration::from_millis(1),
                play_sounds: true,
                calibration_path: calibration_path.clone(),
                arrival_poll: Duration::from_millis(1),
                arrival_timeout: Some(Duration::from_secs(5)),
                queue_poll: Duration::from_millis(5),
            };
            let state = Arc::new(DaemonState::new(STOW, radio_settings()));
            let ephemeris = Arc::new(FixedEphemeris::with(&[
                ("M31", M31),
                ("Low", AzEl::new(200.0, 3.0)),
                ("High", HIGH),
            ]));
            state.ephemeris_locations.replace(Arc::new(ephemeris.locations()));
            state.ephemeris_vlsr.replace(Arc::new(ephemeris.vlsr()));

            let (radio_tx, radio_rx) = radio_channel();
            let running = Arc::new(AtomicBool::new(true));
            let rotor = Rotor::new(Box::new(NoMotor::new(limits())), limits());
            let servo_timing = ServoTiming {
                settle: Duration::from_millis(1),
                poll: Duration::from_millis(1),
                window: Duration::from_millis(100),
                idle: Duration::from_millis(1),
            };
            let servo = ServoLoop::new(
                rotor,
                state.clone(),
                radio_tx.clone(),
                ephemeris.clone(),
                ArrivalTolerance::default(),
                servo_timing,
            );
            let servo = {
                let running = running.clone();
                thread::spawn(move || servo.run(&running))
            };

            let launcher = ScriptedLauncher {
                calibration: Some((
                    calibration_path,
                    r#"{"cal_values": [2.0, 2.0, 2.0, 2.0], "cal_pwr": 0.25}"#.to_string(),
                )),
                ..ScriptedLauncher::default()
            };
            let queue = CommandQueue::new();
            let sender = queue.sender();
            let interpreter = Interpreter::new(
                config,
                state.clone(),
                queue,
                radio_tx,
                ephemeris,
                Box::new(ConstantSpectrum(vec![1.0, 1.0, 1.0, 1.0])),
                Box::new(launcher.clone()),
            );
            Self {
                interpreter,
                state,
                radio: radio_rx,
                launcher,
                sender,
                running,
                servo: Some(servo),
                _dir: dir,
            }
        }

        /// Radio pushes so far, excluding live position reports.
        fn radio_pushes(&self) -> Vec<RadioUpdate> {
            self.radio
                .try_iter()
                .filter(|(name, _)| !matches!(name.as_str(), "motor_az" | "motor_el" | "glat" | "glon"))
                .collect()
        }

        fn arrived(&self) -> bool {
            azel_within_range(
                self.state.rotor_location.get(),
                self.state.rotor_cmd_location(),
                ArrivalTolerance::default(),
            )
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(servo) = self.servo.take() {
                let _ = servo.join();
            }
        }
    }

    #[test]
    fn test_rejected_azel_changes_nothing() {
        let mut h = Harness::new();
        let before = h.state.pointing.get();
        h.radio_pushes();

        h.interpreter.process("azel 5 5");

        assert_eq!(h.state.pointing.get(), before);
        assert_eq!(h.state.rotor_cmd_location(), STOW);
        let log = h.state.error_log.entries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "Object at (5, 5) Not in Motor Bounds");
        assert!(h.radio_pushes().is_empty());
    }

    #[test]
    fn test_track_object_blocks_until_arrival() {
        let mut h = Harness::new();
        h.interpreter.process("M31");

        let pointing = h.state.pointing.get();
        assert_eq!(pointing.tracking.as_deref(), Some("M31"));
        assert_eq!(pointing.destination, M31);
        assert!(h.arrived(), "returned before the rotor arrived");
        assert_eq!(
            h.radio_pushes(),
            vec![
                ("soutrack".to_string(), RadioValue::Text("M31".into())),
                ("vlsr".to_string(), RadioValue::Float(12.5)),
            ]
        );
        assert_eq!(h.state.current_queue_item.get(), IDLE_COMMAND);
    }

    #[test]
    fn test_object_below_limits_is_rejected() {
        let mut h = Harness::new();
        h.interpreter.process("Low");
        assert_eq!(h.state.pointing.get(), Pointing::fixed(STOW));
        assert_eq!(h.state.error_log.entries()[0].message, "Object Low Not in Motor Bounds");
    }

    #[test]
    fn test_freq_pushes_corrected_frequency_once() {
        let mut h = Harness::new();
        h.radio_pushes();
        h.interpreter.process("freq 1420");
        let pushes = h.radio_pushes();
        assert_eq!(
            pushes,
            vec![("freq".to_string(), RadioValue::Float(1_420_000_000.0 + 5_000.0))]
        );
        assert_eq!(h.state.radio.get().center_frequency, 1.42e9);
    }

    #[test]
    fn test_malformed_command_does_not_stop_interpreter() {
        let mut h = Harness::new();
        h.sender.push("azel notanumber 5");
        h.sender.push("azel 100 30");
        h.sender.push("quit");
        h.interpreter.run();

        let log = h.state.error_log.entries();
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("notanumber"), "{}", log[0].message);
        // quit stows after the loop, so the azel is visible only in the radio stream
        let soutracks: Vec<RadioValue> = h
            .radio_pushes()
            .into_iter()
            .filter(|(name, _)| name == "soutrack")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(
            soutracks,
            vec![RadioValue::Text("azel_100_30".into()), RadioValue::Text("at_stow".into())]
        );
        assert!(!h.state.keep_running());
    }

    #[test]
    fn test_oversized_wait_does_not_stop_interpreter() {
        let mut h = Harness::new();
        h.interpreter.process("wait 1e300");
        h.interpreter.process("azel 100 30");

        assert_eq!(h.state.pointing.get(), Pointing::fixed(AzEl::new(100.0, 30.0)));
        assert!(h.arrived());
        let log = h.state.error_log.entries();
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("1e300"));
    }

    #[test]
    fn test_offset_composes_with_destination() {
        let mut h = Harness::new();
        h.interpreter.process("azel 100 30");
        h.interpreter.process("offset 2 -1");
        let pointing = h.state.pointing.get();
        assert_eq!(pointing.destination, AzEl::new(100.0, 30.0));
        assert_eq!(pointing.offsets, AzEl::new(2.0, -1.0));
        assert_eq!(h.state.rotor_cmd_location(), AzEl::new(102.0, 29.0));
        assert!(h.arrived());

        h.interpreter.process("offset 0 60");
        assert_eq!(h.state.rotor_cmd_location(), AzEl::new(102.0, 29.0));
        assert_eq!(h.state.error_log.entries()[0].message, "Offset (0, 60) Out of Bounds");
    }

    #[test]
    fn test_stow_is_idempotent_and_clears_tracking() {
        let mut h = Harness::new();
        h.interpreter.process("M31");
        h.interpreter.process("offset 1 1");
        h.interpreter.process("stow");
        let once = h.state.pointing.get();
        assert_eq!(once, Pointing::fixed(STOW));
        h.interpreter.process("stow");
        assert_eq!(h.state.pointing.get(), once);
        assert!(h.arrived());
        assert!(h.state.error_log.is_empty());
    }

    #[test]
    fn test_cal_points_at_cal_location() {
        let mut h = Harness::new();
        h.interpreter.process("cal");
        assert_eq!(h.state.pointing.get(), Pointing::fixed(AzEl::new(120.0, 20.0)));
    }

    #[test]
    fn test_n_point_scan() {
        let mut h = Harness::new();
        h.interpreter.process("M31 n");

        let data = h.state.n_point_data.get().expect("scan data");
        assert_eq!(data.grid, (3, 3));
        assert_eq!(data.powers.len(), 9);
        assert_eq!(data.rotor_locations.len(), 9);
        assert_eq!(data.scan_center, M31);
        // constant unit spectrum with cal power 1
        assert!(data.powers.iter().all(|&p| (p - 461.0).abs() < 1e-9));
        assert_eq!(data.rotor_locations[0], AzEl::new(120.0 - 1.0 / 44f64.to_radians().cos(), 44.0));

        let pointing = h.state.pointing.get();
        assert_eq!(pointing.tracking.as_deref(), Some("M31"));
        assert_eq!(pointing.offsets, AzEl::default());
        assert_eq!(h.state.rotor_loc_npoint_live.get().len(), 9);
        assert!(h.launcher.events().contains(&"say N-point scan has finished".to_string()));

        h.interpreter.process("stow");
        assert!(h.state.rotor_loc_npoint_live.get().is_empty());
    }

    #[test]
    fn test_scan_near_limit_keeps_commanded_angle_in_bounds() {
        let mut h = Harness::new();
        h.interpreter.process("azel 100 70");
        h.interpreter.process("offset 0 9");
        assert_eq!(h.state.rotor_cmd_location(), AzEl::new(100.0, 79.0));

        let watching = Arc::new(AtomicBool::new(true));
        let watcher = {
            let state = h.state.clone();
            let watching = watching.clone();
            thread::spawn(move || {
                let mut escaped = Vec::new();
                while watching.load(Ordering::SeqCst) {
                    let commanded = state.rotor_cmd_location();
                    if !limits().contains(commanded) {
                        escaped.push(commanded);
                    }
                }
                escaped
            })
        };
        h.interpreter.process("High n");
        watching.store(false, Ordering::SeqCst);
        let escaped = watcher.join().unwrap();

        assert!(escaped.is_empty(), "commanded outside limits: {escaped:?}");
        let data = h.state.n_point_data.get().expect("scan data");
        assert!(data.rotor_locations.iter().all(|&p| limits().contains(p)));
        // the top row lands at 80.5 degrees elevation
        let log = h.state.error_log.entries();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.message.starts_with("Offset") && e.message.ends_with("Out of Bounds")));
        assert!(limits().contains(h.state.rotor_cmd_location()));
    }

    #[test]
    fn test_rejected_visit_leaves_pointing_untouched() {
        let mut h = Harness::new();
        h.interpreter.process("azel 100 70");
        h.interpreter.process("offset 0 9");
        let before = h.state.pointing.get();

        h.interpreter.visit("High", HIGH, AzEl::new(0.0, 1.0));

        assert_eq!(h.state.pointing.get(), before);
        assert_eq!(h.state.error_log.entries()[0].message, "Offset (0, 1) Out of Bounds");
    }

    #[test]
    fn test_beam_switch() {
        let mut h = Harness::new();
        h.interpreter.process("M31 b");

        let data = h.state.beam_switch_data.get().expect("beam switch data");
        assert_eq!(data.powers.len(), 3);
        let azimuths: Vec<f64> = data.rotor_locations.iter().map(|p| p.az).collect();
        let step = 2.0 / 45f64.to_radians().cos();
        assert!((azimuths[0] - (120.0 - step)).abs() < 1e-9);
        assert!((azimuths[1] - 120.0).abs() < 1e-9);
        assert!((azimuths[2] - (120.0 + step)).abs() < 1e-9);

        let markers: Vec<RadioValue> = h
            .radio_pushes()
            .into_iter()
            .filter(|(name, _)| name == "beam_switch")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(
            markers,
            vec![RadioValue::Int(1), RadioValue::Int(2), RadioValue::Int(3), RadioValue::Int(0)]
        );
        assert_eq!(h.state.pointing.get().tracking.as_deref(), Some("M31"));
    }

    #[test]
    fn test_recording_lifecycle() {
        let mut h = Harness::new();
        h.interpreter.process("record obs.rad");
        assert_eq!(h.state.recording.get().as_deref(), Some("obs.rad"));

        h.interpreter.process("record other.rad");
        assert_eq!(
            h.state.error_log.entries()[0].message,
            "Cannot Start Recording - Already Recording"
        );

        h.interpreter.process("samp 2.4");
        assert_eq!(h.state.recording.get(), None);
        assert_eq!(h.state.radio.get().sample_rate, 2.4e6);
        h.interpreter.process("roff");
        assert_eq!(h.launcher.events(), vec!["start obs.rad", "stop obs.rad"]);
    }

    #[test]
    fn test_calibrate_reloads_and_pushes() {
        let mut h = Harness::new();
        h.radio_pushes();
        h.interpreter.process("calibrate");
        let radio = h.state.radio.get();
        assert_eq!(radio.cal_power, 0.25);
        assert_eq!(radio.cal_values.as_slice(), &[2.0; 4]);
        assert_eq!(
            h.radio_pushes(),
            vec![
                ("cal_pwr".to_string(), RadioValue::Float(0.25)),
                ("cal_values".to_string(), RadioValue::FloatArray(vec![2.0; 4])),
            ]
        );
        assert!(h.state.error_log.is_empty());
    }

    #[test]
    fn test_unknown_and_ignored_commands() {
        let mut h = Harness::new();
        h.interpreter.process("* comment");
        h.interpreter.process("x");
        h.interpreter.process("dance");
        let log = h.state.error_log.entries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "Command Not Identified 'dance'");
    }

    #[test]
    fn test_quit_stops_recording_stows_then_stops_radio() {
        let mut h = Harness::new();
        let radio_task = h.interpreter.tasks().start_radio(&radio_settings()).unwrap();
        h.interpreter.set_radio_process(radio_task);
        h.sender.push("record night");
        h.sender.push("azel 100 30");
        h.sender.push("quit");
        h.sender.push("azel 200 30");
        h.interpreter.run();

        assert_eq!(h.state.pointing.get(), Pointing::fixed(STOW));
        assert!(h.arrived());
        assert_eq!(
            h.launcher.events(),
            vec!["start radio", "start night", "stop night", "stop radio"]
        );
        // commands behind quit are never run
        assert_eq!(h.sender.len(), 1);
        let is_running: Vec<RadioValue> = h
            .radio_pushes()
            .into_iter()
            .filter(|(name, _)| name == "is_running")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(is_running, vec![RadioValue::Bool(false)]);
    }
}
