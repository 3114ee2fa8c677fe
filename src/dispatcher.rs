//! Dispatcher — owns the GPIO event loop: startup quiesce, then the
//! routing table.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use log::info;

use crate::gpio::{Event, EventSource, Pin};
use crate::lcd::Lcd;
use crate::menu::Menu;
use crate::state::SharedState;

/// Registers interrupts for every pin, then drains the
/// bootstrap edge each registration produces.
pub fn register_and_quiesce(source: &mut impl EventSource) {
    for pin in Pin::ALL {
        source.add_pin_interrupt(pin);
    }
    for _ in Pin::ALL {
        let _ = source.recv();
    }
}

/// Runs the dispatcher's event loop forever on the calling thread (one
/// event loop: one dispatcher task, blocking read on the GPIO event stream,
/// never processing two events concurrently).
pub fn run<S: EventSource, L: Lcd>(
    source: &S,
    state: &Arc<SharedState>,
    menu: &Arc<Mutex<Menu<L>>>,
) -> ! {
    loop {
        let event = source.recv();
        let mut menu = menu.lock().expect("menu mutex poisoned");
        handle_event(event, state, &mut menu);
    }
}

/// Routes a single event per the dispatcher's routing table. Exposed separately
/// from [`run`] so tests can drive the dispatcher without blocking on a real
/// event source.
pub fn handle_event<L: Lcd>(event: Event, state: &Arc<SharedState>, menu: &mut Menu<L>) {
    match event.pin {
        Pin::Membrane1 => with_menu_busy_guard(state, || {
            info!("button 1 pressed");
            menu.button1_pressed();
        }),
        Pin::Membrane2 => with_menu_busy_guard(state, || {
            info!("button 2 pressed");
            menu.button2_pressed();
        }),
        Pin::Membrane3 => with_menu_busy_guard(state, || {
            info!("button 3 pressed");
            menu.button3_pressed();
        }),
        Pin::Membrane4 => with_menu_busy_guard(state, || {
            info!("button 4 pressed");
            menu.button4_pressed();
        }),
        Pin::LeftLimit => {
            if state.flags.limit_watchdog.load(Ordering::Relaxed) {
                info!("left limit hit, watchdog armed: tripping e-stop");
                state.flags.e_stop.store(true, Ordering::Relaxed);
            }
        }
        Pin::RightLimit => {
            if state.flags.limit_watchdog.load(Ordering::Relaxed) {
                info!("right limit hit, watchdog armed: tripping e-stop");
                state.flags.e_stop.store(true, Ordering::Relaxed);
            }
        }
        Pin::Green => {
            info!("green button: clearing e-stop");
            state.flags.e_stop.store(false, Ordering::Relaxed);
            state.flags.motion.store(false, Ordering::Relaxed);
        }
        Pin::Red => {
            info!("red button: tripping e-stop");
            state.flags.e_stop.store(true, Ordering::Relaxed);
            state.flags.motion.store(false, Ordering::Relaxed);
        }
    }
}

/// Runs `f` only if no menu-key handler is currently mid-debounce, setting
/// `menu_busy_flag`, dispatching `f`, then sleeping `state.debounce` before
/// clearing the flag. Edges observed on any membrane pin while busy are
/// simply dropped by the caller never invoking `f`.
fn with_menu_busy_guard(state: &Arc<SharedState>, f: impl FnOnce()) {
    if state
        .flags
        .menu_busy
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        f();
        spin_sleep::sleep(state.debounce);
        state.flags.menu_busy.store(false, Ordering::Release);
    }
}
