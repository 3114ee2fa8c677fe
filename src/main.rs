use std::sync::{Arc, Mutex};
use std::time::Duration;

use cfg_if::cfg_if;
use log::info;

use plategenie::catalogue;
use plategenie::dispatcher;
use plategenie::gpio::{EventSource, Pin};
use plategenie::lcd::Lcd;
use plategenie::menu::Menu;
use plategenie::motion::MotionEngine;
use plategenie::state::SharedState;

/// Intrinsic stepper pulse period, matching the reference hardware's
/// roughly 1 ms step rate.
const PULSE_DURATION: Duration = Duration::from_micros(1000);

cfg_if! {
    if #[cfg(feature = "rasp")] {
        use plategenie::driver::GpioStepper;
        use plategenie::gpio::{GpioEventSource, GpioLimitSwitches};
        use plategenie::lcd::Hd44780Lcd;

        fn build_hardware() -> (GpioStepper, GpioLimitSwitches, Hd44780Lcd, GpioEventSource) {
            let driver = GpioStepper::new(PULSE_DURATION).expect("failed to open stepper GPIO pins");
            let limits = GpioLimitSwitches::new().expect("failed to open limit switch GPIO pins");
            let lcd = Hd44780Lcd::new().expect("failed to open LCD GPIO pins");
            let events = GpioEventSource::new().expect("failed to open GPIO chip");
            (driver, limits, lcd, events)
        }
    } else {
        use plategenie::driver::SimStepper;
        use plategenie::gpio::{SimEventSource, SimLimitSwitches};
        use plategenie::lcd::SimLcd;

        fn build_hardware() -> (SimStepper, SimLimitSwitches, SimLcd, SimEventSource) {
            (
                SimStepper::new(PULSE_DURATION),
                SimLimitSwitches::new(),
                SimLcd::new(),
                SimEventSource::new(),
            )
        }
    }
}

fn main() {
    env_logger::init();

    let state = SharedState::new();
    let (driver, limits, mut lcd, mut events) = build_hardware();

    lcd.clear();
    lcd.write_line_centered(1, "Welcome to");
    lcd.write_line_centered(2, "PLATE GENIE");
    spin_sleep::sleep(Duration::from_secs(1));

    let engine = Arc::new(Mutex::new(MotionEngine::new(state.clone(), driver, limits)));
    let menu = Arc::new(Mutex::new(Menu::new(lcd)));

    let handler_threads = catalogue::spawn(state.clone(), menu.clone(), engine.clone());

    dispatcher::register_and_quiesce(&mut events);
    info!("startup quiesce complete, {} pins armed", Pin::ALL.len());

    let dispatcher_state = state.clone();
    let dispatcher_menu = menu.clone();
    std::thread::spawn(move || {
        dispatcher::run(&events, &dispatcher_state, &dispatcher_menu);
    });

    info!("plategenie ready, e-stop armed: press green to begin");

    // The dispatcher and handler threads run for the life of the process;
    // the main thread's only remaining job is to keep the binary alive.
    for handle in handler_threads {
        let _ = handle.join();
    }
}
