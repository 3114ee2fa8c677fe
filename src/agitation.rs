//! Agitation controller — repeatedly traverses a user-configurable
//! sub-range centered on the carriage until cancelled.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::driver::StepDriver;
use crate::error::MotionError;
use crate::gpio::LimitSwitches;
use crate::lcd::Lcd;
use crate::menu::Menu;
use crate::motion::MotionEngine;
use crate::state::SharedState;

/// Result of one call to [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgitationOutcome {
    /// The device was not homed; the "please home" hint was shown instead.
    NotHomed,
    /// The cycle was cancelled (either the caller's cancel flag or e-stop).
    Cancelled,
    /// The cycle ended because a motion error other than e-stop occurred.
    Errored(MotionError),
}

/// Runs the agitation cycle on the calling thread until `cancel` returns
/// `true` or an e-stop is observed. Precondition: the
/// axis must already be homed.
pub fn run<D: StepDriver, L: Lcd, Lim: LimitSwitches>(
    engine: &mut MotionEngine<D, Lim>,
    state: &Arc<SharedState>,
    menu: &mut Menu<L>,
    cancel: impl Fn() -> bool,
) -> AgitationOutcome {
    if !state.homed() {
        show_please_home(menu);
        return AgitationOutcome::NotHomed;
    }

    let mut travel_pct = state.params.travel_pct.load(Ordering::Relaxed);
    let mut width = sub_range_width(state, travel_pct);

    let start_offset = (state.homing_step_count() - width) / 2 - state.position();
    // `speed_pct` is validated but never fed into the ramp math;
    // `const_speed_pct` is the only knob that drives it.
    let speed_pct = state.params.speed_pct.load(Ordering::Relaxed);
    let const_speed_pct = state.params.const_speed_pct.load(Ordering::Relaxed);
    if let Err(err) = engine.move_trapezoidal(start_offset, speed_pct, const_speed_pct) {
        return classify(err);
    }

    loop {
        let current_pct = state.params.travel_pct.load(Ordering::Relaxed);
        if current_pct != travel_pct {
            travel_pct = current_pct;
            width = sub_range_width(state, travel_pct);
            let reposition = (state.homing_step_count() - width) / 2 - state.position();
            if let Err(err) = engine.move_trapezoidal(reposition, speed_pct, const_speed_pct) {
                return classify(err);
            }
        }

        if cancel() || state.e_stop() {
            return AgitationOutcome::Cancelled;
        }

        if let Err(err) = engine.move_trapezoidal(width, speed_pct, const_speed_pct) {
            return classify(err);
        }
        if cancel() || state.e_stop() {
            return AgitationOutcome::Cancelled;
        }

        if let Err(err) = engine.move_trapezoidal(-width, speed_pct, const_speed_pct) {
            return classify(err);
        }
        if cancel() || state.e_stop() {
            return AgitationOutcome::Cancelled;
        }
    }
}

fn sub_range_width(state: &SharedState, travel_pct: u32) -> i64 {
    state.homing_step_count() * i64::from(travel_pct) / 100
}

fn classify(err: MotionError) -> AgitationOutcome {
    match err {
        MotionError::EStopTripped { .. } => AgitationOutcome::Cancelled,
        other => AgitationOutcome::Errored(other),
    }
}

/// Shows the "please home the device" hint for one second, restoring the
/// menu screen afterward. Shared with other items that require a prior
/// `home_both` before they run.
pub(crate) fn show_please_home<L: Lcd>(menu: &mut Menu<L>) {
    info!("agitation requested before homing");
    let lcd = menu.lcd_mut();
    lcd.clear();
    lcd.write_line_centered(2, "Please home");
    lcd.write_line_centered(3, "the device.");
    spin_sleep::sleep(Duration::from_secs(1));
    menu.repaint();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimStepper;
    use crate::gpio::SimLimitSwitches;
    use crate::lcd::SimLcd;

    fn homed_state(travel: i64) -> Arc<SharedState> {
        let state = SharedState::new();
        state.flags.e_stop.store(false, Ordering::Relaxed);
        state.flags.homed.store(true, Ordering::Relaxed);
        state.homing_step_count.store(travel, Ordering::Relaxed);
        state.position.store(travel / 2, Ordering::Relaxed);
        state
    }

    #[test]
    fn not_homed_shows_hint_and_returns() {
        let state = SharedState::new();
        let mut menu = Menu::new(SimLcd::new());
        menu.add_item("x", "", "", "a", "b");
        let mut engine = MotionEngine::new(
            state.clone(),
            SimStepper::new(Duration::ZERO),
            SimLimitSwitches::new(),
        );
        let outcome = run(&mut engine, &state, &mut menu, || false);
        assert_eq!(outcome, AgitationOutcome::NotHomed);
    }

    #[test]
    fn cancel_flag_stops_the_cycle() {
        let state = homed_state(1000);
        let mut menu = Menu::new(SimLcd::new());
        menu.add_item("x", "", "", "a", "b");
        let mut engine = MotionEngine::new(
            state.clone(),
            SimStepper::new(Duration::ZERO),
            SimLimitSwitches::new(),
        );
        let outcome = run(&mut engine, &state, &mut menu, || true);
        assert_eq!(outcome, AgitationOutcome::Cancelled);
    }

    #[test]
    fn estop_stops_the_cycle() {
        let state = homed_state(1000);
        let mut menu = Menu::new(SimLcd::new());
        menu.add_item("x", "", "", "a", "b");
        let mut engine = MotionEngine::new(
            state.clone(),
            SimStepper::new(Duration::ZERO),
            SimLimitSwitches::new(),
        );
        state.flags.e_stop.store(true, Ordering::Relaxed);
        let outcome = run(&mut engine, &state, &mut menu, || false);
        assert_eq!(outcome, AgitationOutcome::Cancelled);
    }
}
