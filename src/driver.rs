//! Stepper driver adapter — specified
//! only by the interface the motion engine consumes.
//!
//! Direction convention: "forward" increases `position` (moves away from
//! the left limit).

use std::time::Duration;

use cfg_if::cfg_if;

/// Contract a stepper driver must satisfy. No error returns: the driver is
/// assumed infallible.
pub trait StepDriver {
    /// Emits one forward pulse of [`Self::pulse_duration`].
    fn step_forward(&mut self);

    /// Emits one backward pulse of [`Self::pulse_duration`].
    fn step_backward(&mut self);

    /// Emits `n` forward pulses back-to-back at intrinsic speed.
    fn step_forward_multi(&mut self, n: u32) {
        for _ in 0..n {
            self.step_forward();
        }
    }

    /// Emits `n` backward pulses back-to-back at intrinsic speed.
    fn step_backward_multi(&mut self, n: u32) {
        for _ in 0..n {
            self.step_backward();
        }
    }

    /// The intrinsic duration of a single pulse, queried once by callers
    /// that need it for ramp timing (`move_trapezoidal`).
    fn pulse_duration(&self) -> Duration;

    /// Energises the coils for static holding torque.
    fn enable_hold(&mut self);

    /// Releases the coils.
    fn disable_hold(&mut self);
}

cfg_if! {
    if #[cfg(feature = "rasp")] {
        use rppal::gpio::{Gpio, OutputPin};

        /// Real stepper driver over four GPIO output pins: step, direction,
        /// and two enable lines (the driver board ties coil-A/coil-B enable
        /// separately). Pin numbers per the fixed hardware pin map.
        ///
        /// Grounded on `syact::ctrl::stepper::GenericPWM`.
        pub struct GpioStepper {
            pin_step: OutputPin,
            pin_dir: OutputPin,
            pin_enable_a: OutputPin,
            pin_enable_b: OutputPin,
            pulse: Duration,
        }

        impl GpioStepper {
            /// Creates the driver from the fixed hardware pin map
            /// (step=24, dir=12, enable-A=25, enable-B=8).
            pub fn new(pulse: Duration) -> Result<Self, rppal::gpio::Error> {
                let gpio = Gpio::new()?;
                Ok(Self {
                    pin_step: gpio.get(24)?.into_output(),
                    pin_dir: gpio.get(12)?.into_output(),
                    pin_enable_a: gpio.get(25)?.into_output(),
                    pin_enable_b: gpio.get(8)?.into_output(),
                    pulse,
                })
            }
        }

        impl StepDriver for GpioStepper {
            fn step_forward(&mut self) {
                self.pin_dir.set_high();
                self.pulse();
            }

            fn step_backward(&mut self) {
                self.pin_dir.set_low();
                self.pulse();
            }

            fn pulse_duration(&self) -> Duration {
                self.pulse
            }

            fn enable_hold(&mut self) {
                self.pin_enable_a.set_high();
                self.pin_enable_b.set_high();
            }

            fn disable_hold(&mut self) {
                self.pin_enable_a.set_low();
                self.pin_enable_b.set_low();
            }
        }

        impl GpioStepper {
            fn pulse(&mut self) {
                let half = self.pulse / 2;
                self.pin_step.set_high();
                spin_sleep::sleep(half);
                self.pin_step.set_low();
                spin_sleep::sleep(half);
            }
        }
    }
}

/// In-memory driver used by tests and the `sim` build: records every pulse
/// emitted instead of toggling real pins.
///
/// Grounded on `syact::ctrl::stepper::Stepper::new_sim`.
#[derive(Debug, Default)]
pub struct SimStepper {
    pulse: Duration,
    hold: bool,
    /// Signed step log: `+1` per forward pulse, `-1` per backward pulse.
    pub log: Vec<i64>,
}

impl SimStepper {
    /// Creates a simulated driver with the given intrinsic pulse duration.
    pub fn new(pulse: Duration) -> Self {
        Self {
            pulse,
            hold: false,
            log: Vec::new(),
        }
    }

    /// Net signed displacement recorded so far.
    pub fn position_delta(&self) -> i64 {
        self.log.iter().sum()
    }

    /// Whether the coils are currently held.
    pub fn is_holding(&self) -> bool {
        self.hold
    }
}

impl StepDriver for SimStepper {
    fn step_forward(&mut self) {
        self.log.push(1);
    }

    fn step_backward(&mut self) {
        self.log.push(-1);
    }

    fn pulse_duration(&self) -> Duration {
        self.pulse
    }

    fn enable_hold(&mut self) {
        self.hold = true;
    }

    fn disable_hold(&mut self) {
        self.hold = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_stepper_records_signed_log() {
        let mut d = SimStepper::new(Duration::from_micros(1000));
        d.step_forward_multi(3);
        d.step_backward_multi(1);
        assert_eq!(d.position_delta(), 2);
        assert_eq!(d.log, vec![1, 1, 1, -1]);
    }

    #[test]
    fn sim_stepper_hold_toggles() {
        let mut d = SimStepper::new(Duration::from_micros(1000));
        assert!(!d.is_holding());
        d.enable_hold();
        assert!(d.is_holding());
        d.disable_hold();
        assert!(!d.is_holding());
    }
}
