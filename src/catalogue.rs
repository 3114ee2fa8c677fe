//! Menu catalogue — the nine fixed menu items, each backed by its own
//! long-lived handler thread reading that item's action channel.
//!
//! The motion engine is wrapped in `Arc<Mutex<_>>` here (unlike the bare
//! engine the unit tests in `motion`/`agitation` drive directly): its
//! methods take `&mut self`, so concurrent handler threads need a real lock,
//! not just the engine's internal `motion_flag` CAS, to avoid aliasing it.
//! The same goes for the menu, which the dispatcher thread also writes to.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::agitation::{self, show_please_home};
use crate::driver::StepDriver;
use crate::gpio::LimitSwitches;
use crate::lcd::Lcd;
use crate::menu::{Action, Menu};
use crate::motion::MotionEngine;
use crate::state::SharedState;

/// Step size for every percentage adjustment item (#4, #5, #8).
const PCT_STEP: u32 = 10;
/// Clamp range for Speed (#4) and Travel (#5).
const PCT_RANGE: (u32, u32) = (10, 100);
/// Clamp range for the constant-speed percentage (#8). Restricted to 90 so
/// the trapezoidal profile's `100/C - 1` term never divides by zero.
const CONST_SPEED_RANGE: (u32, u32) = (10, 90);

fn stepped(current: u32, action: Action, range: (u32, u32)) -> u32 {
    let (min, max) = range;
    match action {
        Action::One => (current + PCT_STEP).min(max),
        Action::Two => current.saturating_sub(PCT_STEP).max(min),
    }
}

/// Spawns the nine menu-item handler threads and returns their join
/// handles. Call after every item has been registered on `menu` via
/// [`Menu::add_item`]/[`Menu::add_action`] inside this function, so the
/// dispatcher can start routing softkeys as soon as this returns.
pub fn spawn<D, L, Lim>(
    state: Arc<SharedState>,
    menu: Arc<Mutex<Menu<L>>>,
    engine: Arc<Mutex<MotionEngine<D, Lim>>>,
) -> Vec<JoinHandle<()>>
where
    D: StepDriver + Send + 'static,
    L: Lcd + Send + 'static,
    Lim: LimitSwitches + Send + 'static,
{
    let mut handles = Vec::new();

    // #1 Home Both.
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Home Both", "", "", "GO", "GO");
            menu.add_action(handle)
        };
        let state = state.clone();
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for _action in rx.iter() {
                state.flags.limit_watchdog.store(false, Ordering::Relaxed);
                let result = engine.lock().expect("engine mutex poisoned").home_both();
                if let Err(err) = result {
                    error!("home both: {err}");
                }
            }
        }));
    }

    // #2 Home Single (left/right).
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Home Single", "", "", "LEFT", "RIGHT");
            menu.add_action(handle)
        };
        let state = state.clone();
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                state.flags.limit_watchdog.store(false, Ordering::Relaxed);
                let mut engine = engine.lock().expect("engine mutex poisoned");
                let result = match action {
                    Action::One => engine.home_left(),
                    Action::Two => engine.home_right(),
                };
                drop(engine);
                if let Err(err) = result {
                    error!("home single: {err}");
                }
            }
        }));
    }

    // #3 Move to Center.
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Move to Center", "", "", "GO", "GO");
            menu.add_action(handle)
        };
        let state = state.clone();
        let menu = menu.clone();
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for _action in rx.iter() {
                if !state.homed() {
                    show_please_home(&mut menu.lock().expect("menu mutex poisoned"));
                    continue;
                }
                state.flags.limit_watchdog.store(true, Ordering::Relaxed);
                let target = state.homing_step_count() / 2;
                let delta = target - state.position();
                let speed_pct = state.params.speed_pct.load(Ordering::Relaxed);
                let const_speed_pct = state.params.const_speed_pct.load(Ordering::Relaxed);
                let result = engine
                    .lock()
                    .expect("engine mutex poisoned")
                    .move_trapezoidal(delta, speed_pct, const_speed_pct);
                state.flags.limit_watchdog.store(false, Ordering::Relaxed);
                if let Err(err) = result {
                    error!("move to center: {err}");
                }
            }
        }));
    }

    // #4 Speed ±.
    {
        let (rx, handle) = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Speed", "%", format!("{}", state.params.speed_pct.load(Ordering::Relaxed)), "-", "+");
            (menu.add_action(handle), handle)
        };
        let state = state.clone();
        let menu = menu.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                let updated = stepped(state.params.speed_pct.load(Ordering::Relaxed), action, PCT_RANGE);
                state.params.speed_pct.store(updated, Ordering::Relaxed);
                menu.lock()
                    .expect("menu mutex poisoned")
                    .set_values(handle, format!("{updated}"));
            }
        }));
    }

    // #5 Travel ±.
    {
        let (rx, handle) = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Travel", "%", format!("{}", state.params.travel_pct.load(Ordering::Relaxed)), "-", "+");
            (menu.add_action(handle), handle)
        };
        let state = state.clone();
        let menu = menu.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                let updated = stepped(state.params.travel_pct.load(Ordering::Relaxed), action, PCT_RANGE);
                state.params.travel_pct.store(updated, Ordering::Relaxed);
                menu.lock()
                    .expect("menu mutex poisoned")
                    .set_values(handle, format!("{updated}"));
            }
        }));
    }

    // #6 Stepper Hold.
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Stepper Hold", "", "", "ON", "OFF");
            menu.add_action(handle)
        };
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                let mut engine = engine.lock().expect("engine mutex poisoned");
                match action {
                    Action::One => engine.enable_hold(),
                    Action::Two => engine.disable_hold(),
                }
                drop(engine);
            }
        }));
    }

    // #7 Move to Extents (left/right).
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Move to Extent", "", "", "LEFT", "RIGHT");
            menu.add_action(handle)
        };
        let state = state.clone();
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                state.flags.limit_watchdog.store(true, Ordering::Relaxed);
                let target = match action {
                    Action::One => 0,
                    Action::Two => state.homing_step_count(),
                };
                let delta = target - state.position();
                let speed_pct = state.params.speed_pct.load(Ordering::Relaxed);
                let const_speed_pct = state.params.const_speed_pct.load(Ordering::Relaxed);
                let result = engine
                    .lock()
                    .expect("engine mutex poisoned")
                    .move_trapezoidal(delta, speed_pct, const_speed_pct);
                state.flags.limit_watchdog.store(false, Ordering::Relaxed);
                if let Err(err) = result {
                    error!("move to extent: {err}");
                }
            }
        }));
    }

    // #8 Trapezoidal Motion — constant-speed % ±.
    {
        let (rx, handle) = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item(
                "Const. Speed",
                "%",
                format!("{}", state.params.const_speed_pct.load(Ordering::Relaxed)),
                "-",
                "+",
            );
            (menu.add_action(handle), handle)
        };
        let state = state.clone();
        let menu = menu.clone();
        handles.push(thread::spawn(move || {
            for action in rx.iter() {
                let updated = stepped(
                    state.params.const_speed_pct.load(Ordering::Relaxed),
                    action,
                    CONST_SPEED_RANGE,
                );
                state.params.const_speed_pct.store(updated, Ordering::Relaxed);
                menu.lock()
                    .expect("menu mutex poisoned")
                    .set_values(handle, format!("{updated}"));
            }
        }));
    }

    // #9 Agitation Cycle (begin/end).
    {
        let rx = {
            let mut menu = menu.lock().expect("menu mutex poisoned");
            let handle = menu.add_item("Agitation", "", "", "BEGIN", "END");
            menu.add_action(handle)
        };
        let state = state.clone();
        let menu = menu.clone();
        let engine = engine.clone();
        handles.push(thread::spawn(move || loop {
            let action = match rx.recv() {
                Ok(action) => action,
                Err(_) => break,
            };
            if action != Action::One {
                // Nothing running: an "end" press with no cycle in flight is
                // a no-op.
                continue;
            }
            state.flags.limit_watchdog.store(true, Ordering::Relaxed);
            let mut menu_guard = menu.lock().expect("menu mutex poisoned");
            let mut engine_guard = engine.lock().expect("engine mutex poisoned");
            let outcome = agitation::run(&mut engine_guard, &state, &mut menu_guard, || {
                matches!(rx.try_recv(), Ok(Action::Two))
            });
            drop(engine_guard);
            drop(menu_guard);
            state.flags.limit_watchdog.store(false, Ordering::Relaxed);
            info!("agitation cycle ended: {outcome:?}");
        }));
    }

    handles
}
