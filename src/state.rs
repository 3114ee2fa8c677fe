//! Process-wide shared state.
//!
//! Every scalar here has exactly one writer:
//! the motion engine owns `position`/`homing_step_count`, the dispatcher
//! owns `e_stop`/`motion`/`menu_busy`, and menu handlers own
//! `limit_watchdog`/`homed` and the tunable parameters. All fields are
//! plain atomics behind a shared `Arc`, the same discipline
//! `syact::ctrl::stepper::hr::HRStepper` uses for `_pos`/`_dir`/`_omega_cur`
//! — no compound invariant spans more than one scalar, so no wider lock is
//! needed.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default speed percentage (menu item 4, display-only).
pub const DEFAULT_SPEED_PCT: u32 = 80;
/// Default travel percentage (sub-range width for agitation, menu item 5).
pub const DEFAULT_TRAVEL_PCT: u32 = 50;
/// Default constant-speed percentage driving the trapezoidal profile (menu item 8).
pub const DEFAULT_CONST_SPEED_PCT: u32 = 70;
/// Default per-key debounce duration.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(160);
/// Maximum number of steps any homing phase will take before giving up.
pub const MAX_HOMING_STEPS: i64 = 10_000;
/// Number of steps the back-off guard/single-side homing takes to clear a limit.
pub const BACKOFF_STEPS: i64 = 50;
/// Per-step sleep used by every homing phase except the back-off guard.
pub const HOMING_STEP_DELAY: Duration = Duration::from_millis(1);

/// The five process-wide safety/coordination flags.
#[derive(Debug)]
pub struct Flags {
    /// Motion-inhibit latch. Starts `true`: motion is inhibited until the
    /// green button is pressed.
    pub e_stop: AtomicBool,
    /// Set while any motion call (plain, trapezoidal, homing) is running.
    pub motion: AtomicBool,
    /// Set once a successful `home_both` has completed; cleared by any
    /// single-side homing.
    pub homed: AtomicBool,
    /// Set while a menu-key handler is mid-debounce.
    pub menu_busy: AtomicBool,
    /// When set, a limit-switch edge promotes itself into an e-stop.
    /// Cleared during homing, set before moves that can run into a limit.
    pub limit_watchdog: AtomicBool,
}

impl Flags {
    fn new() -> Self {
        Self {
            e_stop: AtomicBool::new(true),
            motion: AtomicBool::new(false),
            homed: AtomicBool::new(false),
            menu_busy: AtomicBool::new(false),
            limit_watchdog: AtomicBool::new(false),
        }
    }
}

/// Tunable parameters, each owned by the menu handler that adjusts it.
#[derive(Debug)]
pub struct Parameters {
    /// Speed menu value, percent. Validated but never fed into the ramp math.
    pub speed_pct: AtomicU32,
    /// Travel menu value, percent of `homing_step_count` used by agitation.
    pub travel_pct: AtomicU32,
    /// Constant-speed percentage, the only knob feeding `move_trapezoidal`.
    pub const_speed_pct: AtomicU32,
}

impl Parameters {
    fn new() -> Self {
        Self {
            speed_pct: AtomicU32::new(DEFAULT_SPEED_PCT),
            travel_pct: AtomicU32::new(DEFAULT_TRAVEL_PCT),
            const_speed_pct: AtomicU32::new(DEFAULT_CONST_SPEED_PCT),
        }
    }
}

/// The full process-wide state block, passed by `Arc` into every task.
#[derive(Debug)]
pub struct SharedState {
    /// Current carriage position in steps, origin at the left limit.
    pub position: AtomicI64,
    /// Steps measured between the two limit switches by the last successful
    /// `home_both`. Zero until homed.
    pub homing_step_count: AtomicI64,

    pub flags: Flags,
    pub params: Parameters,

    /// Per-key debounce duration, not normally changed at runtime but kept
    /// as a field so tests can shrink it.
    pub debounce: Duration,
}

impl SharedState {
    /// Creates the shared state block with the documented defaults.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            position: AtomicI64::new(0),
            homing_step_count: AtomicI64::new(0),
            flags: Flags::new(),
            params: Parameters::new(),
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    /// Reads `position` (relaxed: single writer, the motion engine).
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Reads `homing_step_count` (relaxed: single writer, the motion engine).
    pub fn homing_step_count(&self) -> i64 {
        self.homing_step_count.load(Ordering::Relaxed)
    }

    /// Reads the e-stop latch.
    pub fn e_stop(&self) -> bool {
        self.flags.e_stop.load(Ordering::Relaxed)
    }

    /// Reads whether a motion call is currently in flight.
    pub fn in_motion(&self) -> bool {
        self.flags.motion.load(Ordering::Relaxed)
    }

    /// Reads the homed flag.
    pub fn homed(&self) -> bool {
        self.flags.homed.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            position: AtomicI64::new(0),
            homing_step_count: AtomicI64::new(0),
            flags: Flags::new(),
            params: Parameters::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_documented_defaults() {
        let st = SharedState::new();
        assert!(st.e_stop());
        assert!(!st.in_motion());
        assert!(!st.homed());
        assert_eq!(st.params.speed_pct.load(Ordering::Relaxed), DEFAULT_SPEED_PCT);
        assert_eq!(st.params.travel_pct.load(Ordering::Relaxed), DEFAULT_TRAVEL_PCT);
        assert_eq!(
            st.params.const_speed_pct.load(Ordering::Relaxed),
            DEFAULT_CONST_SPEED_PCT
        );
        assert_eq!(st.position(), 0);
        assert_eq!(st.homing_step_count(), 0);
    }
}
