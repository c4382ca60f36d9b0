//! Rotor servo loop.
//!
//! Reads the commanded angle from shared state, drives the rotor toward it
//! and publishes the observed position. After issuing a move the loop watches
//! for arrival for a bounded window, then falls back to idle polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hardware::{azel_within_range, ArrivalTolerance, AzEl, Rotor};
use tracing::{debug, info};

use crate::radio::RadioSender;
use crate::state::DaemonState;
use crate::tracking::EphemerisSource;
use crate::wait::{await_condition, sleep_while};

/// Servo cadence.
#[derive(Debug, Clone, Copy)]
pub struct ServoTiming {
    /// Pause after issuing a move before polling
    pub settle: Duration,
    /// Status poll interval while moving
    pub poll: Duration,
    /// How long to watch a move before giving up on it
    pub window: Duration,
    /// Poll interval while on target
    pub idle: Duration,
}

impl Default for ServoTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            poll: Duration::from_millis(500),
            window: Duration::from_secs(10),
            idle: Duration::from_secs(1),
        }
    }
}

pub struct ServoLoop {
    rotor: Rotor,
    state: Arc<DaemonState>,
    radio: RadioSender,
    ephemeris: Arc<dyn EphemerisSource>,
    tolerance: ArrivalTolerance,
    timing: ServoTiming,
    last_error: Option<String>,
}

impl ServoLoop {
    pub fn new(
        rotor: Rotor,
        state: Arc<DaemonState>,
        radio: RadioSender,
        ephemeris: Arc<dyn EphemerisSource>,
        tolerance: ArrivalTolerance,
        timing: ServoTiming,
    ) -> Self {
        Self {
            rotor,
            state,
            radio,
            ephemeris,
            tolerance,
            timing,
            last_error: None,
        }
    }

    /// Repeated identical failures are logged once.
    fn report(&mut self, message: String) {
        if self.last_error.as_deref() != Some(message.as_str()) {
            self.state.error_log.push(message.clone());
            self.last_error = Some(message);
        }
    }

    /// Read the rotor position and publish it if it changed.
    fn poll_position(&mut self) -> AzEl {
        let previous = self.state.rotor_location.get();
        let current = match self.rotor.get_azimuth_elevation() {
            Ok(position) => {
                self.last_error = None;
                position
            }
            Err(e) => {
                self.report(format!("Rotor status failed: {e}"));
                return previous;
            }
        };
        if current != previous {
            debug!("Rotor at {}", current);
            self.state.rotor_location.replace(current);
            let galactic = self.ephemeris.to_galactic(current);
            self.radio.push("motor_az", current.az);
            self.radio.push("motor_el", current.el);
            self.radio.push("glat", galactic.b);
            self.radio.push("glon", galactic.l);
        }
        current
    }

    /// One servo cycle.
    pub fn step(&mut self, running: &AtomicBool) {
        let target = self.state.rotor_cmd_location();
        let location = self.state.rotor_location.get();
        if azel_within_range(location, target, self.tolerance) {
            self.poll_position();
            sleep_while(running, self.timing.idle);
            return;
        }

        debug!("Moving rotor from {} to {}", location, target);
        if let Err(e) = self.rotor.set_azimuth_elevation(target) {
            self.report(format!("Rotor move to {target} failed: {e}"));
            sleep_while(running, self.timing.idle);
            return;
        }
        let timing = self.timing;
        let tolerance = self.tolerance;
        sleep_while(running, timing.settle);
        await_condition(
            || {
                let here = self.poll_position();
                !running.load(Ordering::SeqCst) || azel_within_range(here, target, tolerance)
            },
            timing.poll,
            Some(timing.window),
        );
    }

    pub fn run(mut self, running: &AtomicBool) {
        info!("Servo loop started");
        self.poll_position();
        while running.load(Ordering::SeqCst) {
            self.step(running);
        }
        info!("Servo loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::radio_channel;
    use crate::state::tests::radio_settings;
    use crate::state::Pointing;
    use crate::tracking::tests::FixedEphemeris;
    use hardware::{AngleLimits, AzElLimits, MotorDriver, MotorResult, NoMotor};
    use std::sync::Mutex;

    fn limits() -> AzElLimits {
        AzElLimits::new(AngleLimits::new(0.0, 360.0), AngleLimits::new(10.0, 80.0))
    }

    fn fast() -> ServoTiming {
        ServoTiming {
            settle: Duration::from_millis(1),
            poll: Duration::from_millis(1),
            window: Duration::from_millis(50),
            idle: Duration::from_millis(1),
        }
    }

    /// Moves a fixed step toward the target on every status call.
    struct SlewingMotor {
        position: AzEl,
        target: AzEl,
        points: Arc<Mutex<Vec<AzEl>>>,
    }

    impl MotorDriver for SlewingMotor {
        fn point(&mut self, target: AzEl) -> MotorResult<()> {
            self.points.lock().unwrap().push(target);
            self.target = target;
            Ok(())
        }

        fn status(&mut self) -> MotorResult<AzEl> {
            let step = |from: f64, to: f64| from + (to - from).clamp(-5.0, 5.0);
            self.position = AzEl::new(
                step(self.position.az, self.target.az),
                step(self.position.el, self.target.el),
            );
            Ok(self.position)
        }
    }

    fn servo(rotor: Rotor, state: Arc<DaemonState>) -> (ServoLoop, crossbeam_channel::Receiver<crate::radio::RadioUpdate>) {
        let (radio, rx) = radio_channel();
        let ephemeris = Arc::new(FixedEphemeris::default());
        (
            ServoLoop::new(rotor, state, radio, ephemeris, ArrivalTolerance::default(), fast()),
            rx,
        )
    }

    #[test]
    fn test_moves_to_commanded_and_reports() {
        let state = Arc::new(DaemonState::new(AzEl::new(0.0, 10.0), radio_settings()));
        let rotor = Rotor::new(Box::new(NoMotor::new(limits())), limits());
        let (mut servo, rx) = servo(rotor, state.clone());

        state.pointing.replace(Pointing::fixed(AzEl::new(120.0, 45.0)));
        let running = AtomicBool::new(true);
        servo.step(&running);

        assert_eq!(state.rotor_location.get(), AzEl::new(120.0, 45.0));
        let names: Vec<String> = rx.try_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["motor_az", "motor_el", "glat", "glon"]);
    }

    #[test]
    fn test_slow_mount_is_pointed_once_per_window() {
        let points = Arc::new(Mutex::new(Vec::new()));
        let motor = SlewingMotor {
            position: AzEl::new(0.0, 10.0),
            target: AzEl::new(0.0, 10.0),
            points: points.clone(),
        };
        let state = Arc::new(DaemonState::new(AzEl::new(0.0, 10.0), radio_settings()));
        let (mut servo, _rx) = servo(Rotor::new(Box::new(motor), limits()), state.clone());

        state.pointing.replace(Pointing::fixed(AzEl::new(20.0, 30.0)));
        let running = AtomicBool::new(true);
        servo.step(&running);

        assert_eq!(points.lock().unwrap().as_slice(), &[AzEl::new(20.0, 30.0)]);
        assert_eq!(state.rotor_location.get(), AzEl::new(20.0, 30.0));
    }

    #[test]
    fn test_out_of_bounds_command_is_logged_once() {
        let state = Arc::new(DaemonState::new(AzEl::new(0.0, 10.0), radio_settings()));
        let rotor = Rotor::new(Box::new(NoMotor::new(limits())), limits());
        let (mut servo, _rx) = servo(rotor, state.clone());

        state.pointing.replace(Pointing::fixed(AzEl::new(0.0, 5.0)));
        let running = AtomicBool::new(true);
        servo.step(&running);
        servo.step(&running);
        assert_eq!(state.error_log.len(), 1);
        assert_eq!(state.rotor_location.get(), AzEl::new(0.0, 10.0));
    }
}
