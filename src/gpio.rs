//! GPIO event source — specified only by
//! the interface the dispatcher and motion engine consume: a serialised
//! stream of (pin, edge) events, and synchronous pin-level reads for the
//! limit switches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use cfg_if::cfg_if;

/// Identity of every input pin the dispatcher routes on, per the fixed
/// hardware pin map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    Membrane1,
    Membrane2,
    Membrane3,
    Membrane4,
    Green,
    Red,
    LeftLimit,
    RightLimit,
}

impl Pin {
    /// The BCM GPIO number for this logical pin.
    pub fn gpio_number(self) -> u8 {
        match self {
            Self::Membrane1 => 19,
            Self::Membrane2 => 26,
            Self::Membrane3 => 6,
            Self::Membrane4 => 13,
            Self::Green => 18,
            Self::Red => 23,
            Self::LeftLimit => 21,
            Self::RightLimit => 16,
        }
    }

    /// All pins the dispatcher registers interrupts for, in registration
    /// order. The startup quiesce in `Dispatcher::run` drains exactly one
    /// event per pin in this order.
    pub const ALL: [Pin; 8] = [
        Pin::Membrane1,
        Pin::Membrane2,
        Pin::Membrane3,
        Pin::Membrane4,
        Pin::Green,
        Pin::Red,
        Pin::LeftLimit,
        Pin::RightLimit,
    ];
}

/// A single pin-transition event delivered by the GPIO layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub pin: Pin,
    /// Level the pin read at the time of the transition.
    pub level: bool,
}

/// Blocking source of GPIO events, shared by every registered pin.
pub trait EventSource {
    /// Registers an interrupt on `pin`. The raw GPIO layer
    /// emits one spurious bootstrap edge per registered pin; implementers
    /// must reproduce that so the dispatcher's startup quiesce (draining
    /// exactly one event per pin) behaves identically against real and
    /// simulated hardware.
    fn add_pin_interrupt(&mut self, pin: Pin);

    /// Blocks until the next event arrives, in arrival order. Events from a
    /// single pin are delivered in arrival order; this call never reorders
    /// across pins relative to their registration.
    fn recv(&self) -> Event;
}

/// Synchronous level reads for the two limit switches, used by the motion
/// engine's homing phases (distinct from the event stream the dispatcher
/// consumes).
pub trait LimitSwitches {
    fn left_asserted(&self) -> bool;
    fn right_asserted(&self) -> bool;
}

cfg_if! {
    if #[cfg(feature = "rasp")] {
        use rppal::gpio::{Gpio, InputPin, Trigger};

        /// Real GPIO event source over `rppal`.
        pub struct GpioEventSource {
            gpio: Gpio,
            // Keep registered pins alive; interrupts fire via `gpio.poll_interrupts`-
            // style polling threads owned by rppal's async interrupt API in a real
            // deployment. Kept minimal here since the GPIO layer is out of scope.
            pins: Vec<InputPin>,
            tx: Sender<Event>,
            rx: Receiver<Event>,
        }

        impl GpioEventSource {
            pub fn new() -> Result<Self, rppal::gpio::Error> {
                let (tx, rx) = channel();
                Ok(Self {
                    gpio: Gpio::new()?,
                    pins: Vec::new(),
                    tx,
                    rx,
                })
            }
        }

        impl EventSource for GpioEventSource {
            fn add_pin_interrupt(&mut self, pin: Pin) {
                let trigger = match pin {
                    Pin::LeftLimit | Pin::RightLimit => Trigger::Both,
                    _ => Trigger::RisingEdge,
                };
                if let Ok(mut input) = self.gpio.get(pin.gpio_number()).map(|p| p.into_input()) {
                    let _ = input.set_interrupt(trigger, None);
                    let level = input.is_high();
                    self.pins.push(input);
                    // Bootstrap edge: every newly registered pin reports once,
                    // matching the raw layer's documented quirk.
                    let _ = self.tx.send(Event { pin, level });
                }
            }

            fn recv(&self) -> Event {
                self.rx.recv().expect("event source sender dropped")
            }
        }

        /// Real limit-switch reader over `rppal` input pins (external
        /// pull-ups).
        pub struct GpioLimitSwitches {
            left: InputPin,
            right: InputPin,
        }

        impl GpioLimitSwitches {
            pub fn new() -> Result<Self, rppal::gpio::Error> {
                let gpio = Gpio::new()?;
                Ok(Self {
                    left: gpio.get(Pin::LeftLimit.gpio_number())?.into_input(),
                    right: gpio.get(Pin::RightLimit.gpio_number())?.into_input(),
                })
            }
        }

        impl LimitSwitches for GpioLimitSwitches {
            fn left_asserted(&self) -> bool {
                self.left.is_high()
            }

            fn right_asserted(&self) -> bool {
                self.right.is_high()
            }
        }
    }
}

/// Simulated event source: tests push events with [`SimEventSource::push`];
/// `add_pin_interrupt` reproduces the one-bootstrap-edge-per-pin quirk so
/// dispatcher tests exercise the exact startup quiesce path production code
/// does.
pub struct SimEventSource {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl SimEventSource {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    /// A clonable handle test code uses to inject events after setup.
    pub fn handle(&self) -> SimEventHandle {
        SimEventHandle {
            tx: self.tx.clone(),
        }
    }
}

impl Default for SimEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for SimEventSource {
    fn add_pin_interrupt(&mut self, pin: Pin) {
        let _ = self.tx.send(Event { pin, level: true });
    }

    fn recv(&self) -> Event {
        self.rx.recv().expect("event source sender dropped")
    }
}

/// Cloneable sender side of a [`SimEventSource`], handed to test harnesses.
#[derive(Clone)]
pub struct SimEventHandle {
    tx: Sender<Event>,
}

impl SimEventHandle {
    pub fn send(&self, pin: Pin, level: bool) {
        let _ = self.tx.send(Event { pin, level });
    }
}

/// Simulated limit switches, independently toggleable from test code.
#[derive(Debug, Clone, Default)]
pub struct SimLimitSwitches {
    left: Arc<AtomicBool>,
    right: Arc<AtomicBool>,
}

impl SimLimitSwitches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_left(&self, asserted: bool) {
        self.left.store(asserted, Ordering::Relaxed);
    }

    pub fn set_right(&self, asserted: bool) {
        self.right.store(asserted, Ordering::Relaxed);
    }
}

impl LimitSwitches for SimLimitSwitches {
    fn left_asserted(&self) -> bool {
        self.left.load(Ordering::Relaxed)
    }

    fn right_asserted(&self) -> bool {
        self.right.load(Ordering::Relaxed)
    }
}
