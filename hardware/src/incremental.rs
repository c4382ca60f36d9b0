//! Driver for incremental "move N counts" mounts (H180 and CASSI).
//!
//! # Protocol Overview
//!
//! The controller accepts one relative move per axis:
//!
//! ```text
//!  move <dir> <count>\r
//! ```
//!
//! where `dir` is `0` (azimuth down), `1` (azimuth up), `2` (elevation down)
//! or `3` (elevation up). It answers with a short line (at most 32 bytes, CR
//! or LF terminated) whose last `M` or `T` marks the outcome:
//!
//! - `M ... <count>` - move completed, `<count>` is the distance actually travelled
//! - `T ... <count>` - timed out on a limit switch, the commanded count is assumed
//!
//! The mount has no absolute encoder. Position is the running sum of counts
//! since startup, and count zero is the lower corner of the configured limits.
//! Each call moves at most `counts_per_step` per axis, so the caller re-issues
//! [`point`](MotorDriver::point) until the mount settles.

use std::io::{Read, Write};

use tracing::{debug, trace, warn};

use crate::angles::{AzEl, AzElLimits};
use crate::motor::{MotorDriver, MotorError, MotorResult};

/// Longest reply line the controller sends.
const MAX_REPLY_LEN: usize = 32;

/// Baud rate both controllers expect.
pub const EXPECTED_BAUDRATE: u32 = 2400;

/// Push-rod elevation linkage.
///
/// Elevation is driven by a screw jack whose extension is counted, so the
/// count-to-angle mapping follows the triangle formed by the rigid arm and
/// the rod.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushRod {
    /// Rigid arm length
    pub arm: f64,
    /// Distance from the rod's upper joint to the elevation axis
    pub joint: f64,
    /// Rod collar offset
    pub collar: f64,
    /// Linkage angle at the horizon in degrees
    pub horizon_angle: f64,
    /// Counts per inch of rod travel
    pub counts_per_inch: f64,
}

impl PushRod {
    /// Rod length for a given elevation, clamped at zero when the geometry is
    /// not reachable.
    fn rod_length(&self, el_deg: f64) -> f64 {
        let sq = self.arm * self.arm + self.joint * self.joint
            - 2.0 * self.arm * self.joint * (self.horizon_angle - el_deg).to_radians().cos()
            - self.collar * self.collar;
        if sq >= 0.0 {
            sq.sqrt()
        } else {
            0.0
        }
    }

    /// Count position for `el_deg` when count zero sits at `el_origin`.
    pub fn counts_for(&self, el_deg: f64, el_origin: f64) -> f64 {
        (self.rod_length(el_origin) - self.rod_length(el_deg)) * self.counts_per_inch
    }

    /// Inverse of [`counts_for`](Self::counts_for).
    pub fn elevation_for(&self, counts: f64, el_origin: f64) -> f64 {
        let len = self.rod_length(el_origin) - counts / self.counts_per_inch;
        let cos = (self.arm * self.arm + self.joint * self.joint
            - self.collar * self.collar
            - len * len)
            / (2.0 * self.arm * self.joint);
        self.horizon_angle - cos.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// How elevation counts map to degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElevationDrive {
    /// Counts proportional to degrees.
    Linear { counts_per_deg: f64 },
    /// Push-rod screw jack.
    PushRod(PushRod),
}

impl ElevationDrive {
    fn counts_for(&self, el_deg: f64, el_origin: f64) -> f64 {
        match self {
            ElevationDrive::Linear { counts_per_deg } => (el_deg - el_origin) * counts_per_deg,
            ElevationDrive::PushRod(rod) => rod.counts_for(el_deg, el_origin),
        }
    }

    fn elevation_for(&self, counts: f64, el_origin: f64) -> f64 {
        match self {
            ElevationDrive::Linear { counts_per_deg } => counts / counts_per_deg + el_origin,
            ElevationDrive::PushRod(rod) => rod.elevation_for(counts, el_origin),
        }
    }
}

/// Mechanical description of a counting mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountProfile {
    pub az_counts_per_deg: f64,
    pub elevation: ElevationDrive,
    /// Per-axis clamp on a single move
    pub counts_per_step: f64,
    /// Position of the count token in the reply, counted from the end (1 = last)
    pub reply_count_field: usize,
}

impl MountProfile {
    /// H180 mount: 52 * 27 / 120 counts per degree on both axes.
    pub fn h180() -> Self {
        let cpd = 52.0 * 27.0 / 120.0;
        Self {
            az_counts_per_deg: cpd,
            elevation: ElevationDrive::Linear {
                counts_per_deg: cpd,
            },
            counts_per_step: 100.0,
            reply_count_field: 1,
        }
    }

    /// CASSI mount: geared azimuth and a push-rod elevation drive.
    pub fn cassi() -> Self {
        Self {
            az_counts_per_deg: 8.0 * 32.0 * 60.0 / (360.0 * 9.0),
            elevation: ElevationDrive::PushRod(PushRod {
                arm: 14.25,
                joint: 16.5,
                collar: 2.0,
                horizon_angle: 110.0,
                counts_per_inch: 30.0,
            }),
            counts_per_step: 10000.0,
            reply_count_field: 3,
        }
    }
}

/// Move direction code sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    AzDown = 0,
    AzUp = 1,
    ElDown = 2,
    ElUp = 3,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::AzDown | Direction::ElDown => -1.0,
            Direction::AzUp | Direction::ElUp => 1.0,
        }
    }
}

/// Counting mount attached to a byte stream.
pub struct IncrementalMotor<P> {
    port: P,
    profile: MountProfile,
    origin: AzEl,
    az_count: f64,
    el_count: f64,
}

impl<P: Read + Write + Send> IncrementalMotor<P> {
    /// Counts start at zero, which is the lower corner of `limits`.
    pub fn new(port: P, profile: MountProfile, limits: AzElLimits) -> Self {
        Self {
            port,
            profile,
            origin: limits.lower_corner(),
            az_count: 0.0,
            el_count: 0.0,
        }
    }

    /// Accumulated (azimuth, elevation) counts since startup.
    pub fn counts(&self) -> (f64, f64) {
        (self.az_count, self.el_count)
    }

    /// Clamp a count delta to one step and round away from zero.
    fn step_counts(&self, delta: f64) -> i64 {
        let step = self.profile.counts_per_step;
        let clamped = delta.clamp(-step, step);
        let rounded = if clamped > 0.0 {
            clamped + 0.5
        } else {
            clamped - 0.5
        };
        rounded.trunc() as i64
    }

    fn read_reply(&mut self) -> MotorResult<String> {
        let mut reply = Vec::with_capacity(MAX_REPLY_LEN);
        let mut byte = [0u8; 1];
        while reply.len() < MAX_REPLY_LEN {
            self.port.read_exact(&mut byte)?;
            reply.push(byte[0]);
            if byte[0] == b'\r' || byte[0] == b'\n' {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Issue one move and return the signed count change.
    fn send_move(&mut self, direction: Direction, count: u64) -> MotorResult<f64> {
        let cmd = format!(" move {} {}\r", direction as u8, count);
        debug!("Incremental >> {:?}", cmd);
        self.port.write_all(cmd.as_bytes())?;
        self.port.flush()?;

        let reply = self.read_reply()?;
        trace!("Incremental << {:?}", reply);

        let marker = reply
            .rfind(['M', 'T'])
            .ok_or_else(|| MotorError::InvalidResponse(format!("no M/T marker in {reply:?}")))?;
        let tail = &reply[marker..];
        let fields: Vec<&str> = tail.split_whitespace().collect();
        let field = fields
            .len()
            .checked_sub(self.profile.reply_count_field)
            .and_then(|i| fields.get(i))
            .ok_or_else(|| MotorError::InvalidResponse(format!("missing count in {reply:?}")))?;
        let reported: f64 = field
            .parse::<i64>()
            .map_err(|_| MotorError::InvalidResponse(format!("bad count {field:?}")))?
            as f64;

        let moved = if tail.starts_with('M') {
            reported
        } else {
            warn!(
                "Mount timed out moving {:?}, assuming {} counts",
                direction, count
            );
            count as f64
        };
        Ok(direction.sign() * moved)
    }

    fn move_axis(&mut self, delta: f64, down: Direction, up: Direction) -> MotorResult<f64> {
        let count = self.step_counts(delta);
        if count == 0 {
            return Ok(0.0);
        }
        let direction = if count > 0 { up } else { down };
        self.send_move(direction, count.unsigned_abs())
    }
}

impl<P: Read + Write + Send> MotorDriver for IncrementalMotor<P> {
    fn point(&mut self, target: AzEl) -> MotorResult<()> {
        let az_target = (target.az - self.origin.az) * self.profile.az_counts_per_deg;
        let az_moved = self.move_axis(az_target - self.az_count, Direction::AzDown, Direction::AzUp)?;
        self.az_count += az_moved;

        let el_target = self.profile.elevation.counts_for(target.el, self.origin.el);
        let el_moved = self.move_axis(el_target - self.el_count, Direction::ElDown, Direction::ElUp)?;
        self.el_count += el_moved;

        debug!(
            "Counts now az={} el={}",
            self.az_count, self.el_count
        );
        Ok(())
    }

    fn status(&mut self) -> MotorResult<AzEl> {
        let az = self.az_count / self.profile.az_counts_per_deg + self.origin.az;
        let el = self
            .profile
            .elevation
            .elevation_for(self.el_count, self.origin.el);
        Ok(AzEl::new(az, el))
    }
}
