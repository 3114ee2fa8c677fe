//! Error taxonomy returned by the motion engine.

use core::fmt;

/// Errors returned by [`crate::motion::MotionEngine`] operations.
///
/// All variants are recovered at the handler-task boundary: a handler simply
/// clears its private in-flight flag and returns to waiting on its action
/// stream. No variant is fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionError {
    /// A second motion call was entered while one was already active.
    AlreadyInMotion,
    /// `speed_pct` or `constant_speed_pct` was out of its valid range.
    BadParameter(BadParameter),
    /// The red button or the limit watchdog fired mid-movement.
    ///
    /// `steps_completed` is the signed number of pulses actually emitted
    /// before the stop was observed, so callers can reconcile `position`.
    EStopTripped {
        /// Signed pulses emitted before the stop.
        steps_completed: i64,
    },
    /// `max_homing_steps` elapsed without seeing the expected limit switch.
    HomingOverrun,
    /// The back-off heuristic could not dislodge the carriage from an
    /// already-asserted limit switch.
    HomingMalfunction,
}

/// Which homing/trapezoidal parameter was out of range, and the bad value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadParameter {
    /// `speed_pct` must be in `[1, 100]`.
    SpeedPct(u32),
    /// `constant_speed_pct` must be in `[1, 99]`.
    ConstantSpeedPct(u32),
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInMotion => f.write_str("a motion call is already in progress"),
            Self::BadParameter(BadParameter::SpeedPct(v)) => {
                write!(f, "speed percentage {v} is out of range [1, 100]")
            }
            Self::BadParameter(BadParameter::ConstantSpeedPct(v)) => {
                write!(f, "constant-speed percentage {v} is out of range [1, 99]")
            }
            Self::EStopTripped { steps_completed } => {
                write!(f, "e-stop tripped after {steps_completed} step(s)")
            }
            Self::HomingOverrun => f.write_str("homing exceeded the maximum step budget"),
            Self::HomingMalfunction => {
                f.write_str("back-off could not clear an already-asserted limit switch")
            }
        }
    }
}

impl std::error::Error for MotionError {}
