//! Motion engine — the real-time core: plain moves, the trapezoidal
//! velocity profile, and the three homing procedures.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::driver::StepDriver;
use crate::error::{BadParameter, MotionError};
use crate::gpio::LimitSwitches;
use crate::state::{SharedState, BACKOFF_STEPS, HOMING_STEP_DELAY, MAX_HOMING_STEPS};

/// Drives a single stepper axis against the shared process state.
///
/// Generic over the driver and limit-switch implementations so the same
/// code runs against real `rppal` hardware and the in-memory simulators used
/// by tests.
pub struct MotionEngine<D, L> {
    state: Arc<SharedState>,
    driver: D,
    limits: L,
}

/// RAII guard enforcing mutual exclusion: motion calls are mutually
/// exclusive. Clears `motion_flag` on drop so every return path (success,
/// error, or early return) releases it exactly once.
struct MotionGuard<'a> {
    state: &'a SharedState,
}

impl<'a> MotionGuard<'a> {
    fn acquire(state: &'a SharedState) -> Result<Self, MotionError> {
        state
            .flags
            .motion
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MotionError::AlreadyInMotion)?;
        Ok(Self { state })
    }
}

impl Drop for MotionGuard<'_> {
    fn drop(&mut self) {
        self.state.flags.motion.store(false, Ordering::Release);
    }
}

impl<D: StepDriver, L: LimitSwitches> MotionEngine<D, L> {
    /// Creates a motion engine over the given driver, limit switches, and
    /// shared state.
    pub fn new(state: Arc<SharedState>, driver: D, limits: L) -> Self {
        Self {
            state,
            driver,
            limits,
        }
    }

    /// Direct access to the shared state, e.g. for reading `position` from
    /// outside the engine.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Energises the coils for static holding torque (menu item 6).
    pub fn enable_hold(&mut self) {
        self.driver.enable_hold();
    }

    /// Releases the coils (menu item 6).
    pub fn disable_hold(&mut self) {
        self.driver.disable_hold();
    }

    fn e_stop_tripped(&self) -> bool {
        self.state.flags.e_stop.load(Ordering::Relaxed)
    }

    /// Checks the e-stop latch before a pulse would be emitted. Every
    /// invariant that says "e_stop_flag was read
    /// false immediately prior" to a pulse routes through this call.
    fn check_estop(&self, emitted_so_far: i64) -> Result<(), MotionError> {
        if self.e_stop_tripped() {
            Err(MotionError::EStopTripped {
                steps_completed: emitted_so_far,
            })
        } else {
            Ok(())
        }
    }

    fn advance_position(&self, delta: i64) {
        self.state.position.fetch_add(delta, Ordering::Relaxed);
    }

    // ---- Plain move --------------------------------------------------------

    /// Moves `signed_steps` at the driver's intrinsic rate. Positive moves
    /// forward (away from the left limit), negative moves backward.
    pub fn move_steps(&mut self, signed_steps: i64) -> Result<(), MotionError> {
        let _guard = MotionGuard::acquire(&self.state)?;

        let count = signed_steps.unsigned_abs();
        let sign: i64 = if signed_steps >= 0 { 1 } else { -1 };
        let mut emitted: i64 = 0;

        for _ in 0..count {
            self.check_estop(emitted)?;
            if sign > 0 {
                self.driver.step_forward();
            } else {
                self.driver.step_backward();
            }
            emitted += sign;
            self.advance_position(sign);
        }

        Ok(())
    }

    // ---- Trapezoidal move ----------------------------------------------

    /// Moves `signed_steps` with a piecewise-linear accel/constant/decel
    /// velocity profile. This is a
    /// literal transcription of `examples/original_source/motion.go`'s
    /// `moveTrapezoidal`.
    pub fn move_trapezoidal(
        &mut self,
        signed_steps: i64,
        speed_pct: u32,
        constant_speed_pct: u32,
    ) -> Result<(), MotionError> {
        if !(1..=100).contains(&speed_pct) {
            return Err(MotionError::BadParameter(BadParameter::SpeedPct(speed_pct)));
        }
        if !(1..=99).contains(&constant_speed_pct) {
            return Err(MotionError::BadParameter(BadParameter::ConstantSpeedPct(
                constant_speed_pct,
            )));
        }
        if signed_steps == 0 {
            return Ok(());
        }

        let _guard = MotionGuard::acquire(&self.state)?;

        let forward = signed_steps > 0;
        let sign: i64 = if forward { 1 } else { -1 };
        let total_steps = signed_steps.unsigned_abs();

        let p = self.driver.pulse_duration().as_secs_f64();
        let c = f64::from(constant_speed_pct);
        let delta_c = p * (100.0 / c - 1.0);
        let t_c = p + delta_c;

        let (n_accel, n_const, n_decel) = ramp_counts(total_steps, constant_speed_pct);

        debug!(
            "trapezoidal move: total={total_steps} n_accel={n_accel} n_const={n_const} n_decel={n_decel}"
        );

        let accel_delta = if n_accel > 0 {
            let accel_time = (n_accel as f64) * 2.0 * t_c;
            let min_accel_time = (n_accel as f64) * p;
            (accel_time - min_accel_time) / (n_accel as f64 * n_accel as f64)
        } else {
            0.0
        };

        let mut emitted: i64 = 0;

        // Accel ramp.
        let mut sleep = delta_c + accel_delta * n_accel as f64;
        for _ in 0..n_accel {
            self.check_estop(emitted)?;
            self.emit_signed(sign);
            emitted += sign;
            spin_sleep::sleep(secs(sleep));
            sleep -= accel_delta;
        }

        // Constant speed.
        for _ in 0..n_const {
            self.check_estop(emitted)?;
            self.emit_signed(sign);
            emitted += sign;
            spin_sleep::sleep(secs(delta_c));
        }

        // Decel ramp.
        let mut sleep = delta_c;
        for _ in 0..n_decel {
            self.check_estop(emitted)?;
            self.emit_signed(sign);
            emitted += sign;
            spin_sleep::sleep(secs(sleep));
            sleep += accel_delta;
        }

        Ok(())
    }

    fn emit_signed(&mut self, sign: i64) {
        if sign > 0 {
            self.driver.step_forward();
        } else {
            self.driver.step_backward();
        }
        self.advance_position(sign);
    }

    // ---- Homing --------------------------------------------------------

    /// Seeks the left limit, sweeps to the right limit counting steps, and
    /// returns to the midpoint, establishing `position == 0` at the left
    /// limit and publishing `homing_step_count`.
    pub fn home_both(&mut self) -> Result<(), MotionError> {
        let _guard = MotionGuard::acquire(&self.state)?;
        self.state.flags.homed.store(false, Ordering::Relaxed);

        // Phase 0: back-off guard. No inter-step sleep here, unlike the
        // other homing phases.
        if self.limits.left_asserted() && !self.limits.right_asserted() {
            let mut emitted = 0i64;
            for _ in 0..BACKOFF_STEPS {
                self.check_estop(emitted)?;
                if self.limits.right_asserted() {
                    break;
                }
                self.driver.step_forward();
                self.advance_position(1);
                emitted += 1;
            }
            if self.limits.left_asserted() {
                warn!("home_both: back-off guard could not clear the left limit");
                self.state.flags.homed.store(false, Ordering::Relaxed);
                return Err(MotionError::HomingMalfunction);
            }
        }

        // Phase 1: seek left.
        let mut emitted = 0i64;
        let mut seen = 0i64;
        while !self.limits.left_asserted() {
            self.check_estop(emitted)?;
            if seen >= MAX_HOMING_STEPS {
                return Err(MotionError::HomingOverrun);
            }
            self.driver.step_backward();
            self.advance_position(-1);
            emitted -= 1;
            seen += 1;
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }
        info!("home_both: left limit reached");

        // Set the position origin at the left limit.
        self.state.position.store(0, Ordering::Relaxed);

        // Phase 2: sweep right, counting steps taken while both limits read
        // clear (so the ~1-step transition region is excluded).
        let mut count = 0i64;
        seen = 0;
        while !self.limits.right_asserted() {
            self.check_estop(count)?;
            if seen >= MAX_HOMING_STEPS {
                return Err(MotionError::HomingOverrun);
            }
            self.driver.step_forward();
            self.advance_position(1);
            seen += 1;
            if !self.limits.left_asserted() && !self.limits.right_asserted() {
                count += 1;
            }
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }
        info!("home_both: right limit reached, homing_step_count={count}");

        // Phase 3: return to center, or until the left limit safety-reasserts.
        let half = count / 2;
        let mut back = 0i64;
        while back < half && !self.limits.left_asserted() {
            self.check_estop(-back)?;
            self.driver.step_backward();
            self.advance_position(-1);
            back += 1;
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }

        self.state.homing_step_count.store(count, Ordering::Relaxed);
        self.state.flags.homed.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Seeks the left limit, clearing `homed_flag` first (any single-side
    /// homing invalidates the previous `home_both` result).
    pub fn home_left(&mut self) -> Result<(), MotionError> {
        let _guard = MotionGuard::acquire(&self.state)?;
        self.state.flags.homed.store(false, Ordering::Relaxed);

        let mut seen = 0i64;
        while !self.limits.left_asserted() {
            self.check_estop(-seen)?;
            if seen >= MAX_HOMING_STEPS {
                return Err(MotionError::HomingOverrun);
            }
            self.driver.step_backward();
            self.advance_position(-1);
            seen += 1;
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }

        for _ in 0..BACKOFF_STEPS {
            self.check_estop(-seen)?;
            self.driver.step_forward();
            self.advance_position(1);
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }

        Ok(())
    }

    /// Seeks the right limit, clearing `homed_flag` first.
    pub fn home_right(&mut self) -> Result<(), MotionError> {
        let _guard = MotionGuard::acquire(&self.state)?;
        self.state.flags.homed.store(false, Ordering::Relaxed);

        let mut seen = 0i64;
        while !self.limits.right_asserted() {
            self.check_estop(seen)?;
            if seen >= MAX_HOMING_STEPS {
                return Err(MotionError::HomingOverrun);
            }
            self.driver.step_forward();
            self.advance_position(1);
            seen += 1;
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }

        for _ in 0..BACKOFF_STEPS {
            self.check_estop(seen)?;
            self.driver.step_backward();
            self.advance_position(-1);
            spin_sleep::sleep(HOMING_STEP_DELAY);
        }

        Ok(())
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

/// Splits `total_steps` into accel/constant/decel counts for the
/// trapezoidal profile, assuming the average velocity on each ramp equals
/// half the constant velocity. Pulled out of [`MotionEngine::move_trapezoidal`]
/// so its conservation invariants (`N_accel + N_const + N_decel ==
/// total_steps`, `N_accel <= N_decel <= N_accel + 1`) can be property-tested
/// without driving a whole simulated move.
fn ramp_counts(total_steps: u64, constant_speed_pct: u32) -> (i64, i64, i64) {
    let c = f64::from(constant_speed_pct);
    let ramp_total = (total_steps as f64 / (2.0 / (100.0 / c - 1.0) + 1.0)).floor() as i64;
    let n_accel = ramp_total / 2;
    let n_decel = ramp_total - n_accel;
    let n_const = total_steps as i64 - n_accel - n_decel;
    (n_accel, n_const, n_decel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimStepper;
    use crate::gpio::SimLimitSwitches;

    fn engine(pulse_us: u64) -> MotionEngine<SimStepper, SimLimitSwitches> {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        let driver = SimStepper::new(Duration::from_micros(pulse_us));
        let limits = SimLimitSwitches::new();
        MotionEngine::new(state, driver, limits)
    }

    #[test]
    fn move_steps_updates_position() {
        let mut m = engine(0);
        m.move_steps(120).unwrap();
        assert_eq!(m.state().position(), 120);
        m.move_steps(-50).unwrap();
        assert_eq!(m.state().position(), 70);
    }

    #[test]
    fn move_steps_rejects_reentry() {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        state.flags.motion.store(true, Ordering::Relaxed);
        let mut m = MotionEngine::new(state, SimStepper::new(Duration::ZERO), SimLimitSwitches::new());
        assert_eq!(m.move_steps(10), Err(MotionError::AlreadyInMotion));
    }

    #[test]
    fn move_steps_stops_on_estop() {
        let mut m = engine(0);
        m.state.flags.e_stop.store(true, Ordering::Relaxed);
        let err = m.move_steps(10).unwrap_err();
        assert_eq!(err, MotionError::EStopTripped { steps_completed: 0 });
        assert_eq!(m.state().position(), 0);
    }

    #[test]
    fn trapezoidal_zero_is_noop() {
        let mut m = engine(1000);
        m.move_trapezoidal(0, 80, 70).unwrap();
        assert_eq!(m.state().position(), 0);
    }

    #[test]
    fn trapezoidal_rejects_bad_speed() {
        let mut m = engine(1000);
        assert_eq!(
            m.move_trapezoidal(100, 0, 70),
            Err(MotionError::BadParameter(BadParameter::SpeedPct(0)))
        );
        assert_eq!(
            m.move_trapezoidal(100, 101, 70),
            Err(MotionError::BadParameter(BadParameter::SpeedPct(101)))
        );
    }

    #[test]
    fn trapezoidal_rejects_constant_speed_100() {
        let mut m = engine(1000);
        assert_eq!(
            m.move_trapezoidal(100, 80, 100),
            Err(MotionError::BadParameter(BadParameter::ConstantSpeedPct(100)))
        );
    }

    #[test]
    fn trapezoidal_conserves_step_count() {
        let mut m = engine(0);
        m.move_trapezoidal(4000, 50, 70).unwrap();
        assert_eq!(m.state().position(), 4000);
    }

    #[test]
    fn trapezoidal_negative_moves_backward() {
        let mut m = engine(0);
        m.move_trapezoidal(-1000, 80, 70).unwrap();
        assert_eq!(m.state().position(), -1000);
    }

    /// Limit switches tied to `position`, so a `MotionEngine` driving a
    /// `SimStepper` can run the real `home_both` state machine end to end:
    /// left asserts at or below zero, right asserts at or above `travel`.
    #[derive(Clone)]
    struct TravelLimits {
        state: Arc<SharedState>,
        travel: i64,
    }

    impl LimitSwitches for TravelLimits {
        fn left_asserted(&self) -> bool {
            self.state.position() <= 0
        }

        fn right_asserted(&self) -> bool {
            self.state.position() >= self.travel
        }
    }

    #[test]
    fn home_both_from_mid_travel_succeeds() {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        state.position.store(500, Ordering::Relaxed);
        let limits = TravelLimits {
            state: state.clone(),
            travel: 1000,
        };
        let mut m = MotionEngine::new(state, SimStepper::new(Duration::ZERO), limits);

        m.home_both().unwrap();

        assert!(m.state().homed());
        assert!(m.state().homing_step_count() > 0);
        // Carriage ends near the midpoint of the measured travel.
        let mid = m.state().homing_step_count() / 2;
        assert!((m.state().position() - mid).abs() <= 2);
    }

    #[test]
    fn home_both_backs_off_when_starting_on_left_limit() {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        state.position.store(0, Ordering::Relaxed);
        let limits = TravelLimits {
            state: state.clone(),
            travel: 1000,
        };
        let mut m = MotionEngine::new(state, SimStepper::new(Duration::ZERO), limits);

        m.home_both().unwrap();

        assert!(m.state().homed());
        assert!(m.state().homing_step_count() > 0);
    }

    #[test]
    fn home_both_overruns_when_right_limit_never_asserts() {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        state.position.store(500, Ordering::Relaxed);
        // travel far beyond MAX_HOMING_STEPS so the sweep-right phase
        // exhausts its budget.
        let limits = TravelLimits {
            state: state.clone(),
            travel: MAX_HOMING_STEPS * 10,
        };
        let mut m = MotionEngine::new(state, SimStepper::new(Duration::ZERO), limits);

        assert_eq!(m.home_both(), Err(MotionError::HomingOverrun));
        assert!(!m.state().homed());
    }

    #[test]
    fn home_left_clears_homed_flag() {
        let mut m = engine(0);
        m.state.flags.homed.store(true, Ordering::Relaxed);
        m.limits.set_left(true);
        m.home_left().unwrap();
        assert!(!m.state().homed());
    }
}

#[cfg(test)]
mod ramp_properties {
    use super::*;
    use crate::driver::SimStepper;
    use crate::gpio::SimLimitSwitches;
    use proptest::prelude::*;

    fn engine() -> MotionEngine<SimStepper, SimLimitSwitches> {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        MotionEngine::new(state, SimStepper::new(Duration::ZERO), SimLimitSwitches::new())
    }

    proptest! {
        /// `N_accel + N_const + N_decel == total_steps` for every valid
        /// `constant_speed_pct`.
        #[test]
        fn ramp_counts_conserve_total(total in 0u64..20_000, c in 1u32..100) {
            let (n_accel, n_const, n_decel) = ramp_counts(total, c);
            prop_assert_eq!(n_accel + n_const + n_decel, total as i64);
        }

        /// The decel loop absorbs the parity bit: `N_accel <= N_decel <= N_accel + 1`.
        #[test]
        fn decel_absorbs_parity(total in 0u64..20_000, c in 1u32..100) {
            let (n_accel, _n_const, n_decel) = ramp_counts(total, c);
            prop_assert!(n_accel <= n_decel);
            prop_assert!(n_decel <= n_accel + 1);
        }

        /// For any sequence of successful `move_trapezoidal` calls, the final
        /// `position` equals the starting position plus the sum of signed
        /// step requests (bounded away from 100 so `constant_speed_pct` stays
        /// valid, and capped so the test runs fast with a zero pulse width).
        #[test]
        fn position_tracks_sum_of_signed_requests(
            steps in prop::collection::vec(-500i64..=500, 1..8),
            speed in 1u32..=100,
            const_speed in 1u32..99,
        ) {
            let mut m = engine();
            let mut expected = 0i64;
            for s in steps {
                m.move_trapezoidal(s, speed, const_speed).unwrap();
                expected += s;
            }
            prop_assert_eq!(m.state().position(), expected);
        }
    }
}
