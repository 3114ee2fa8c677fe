//! LCD renderer — a blocking text-line
//! driver for the 20×4 character display. Specified only by the interface
//! the menu model consumes: four fixed-width lines, a centering helper, and
//! the two custom arrow glyphs used on the adjustments line.

use cfg_if::cfg_if;

/// Columns on the display.
pub const COLUMNS: usize = 20;
/// Rows on the display.
pub const ROWS: usize = 4;

/// Custom CGRAM glyph slot for the left arrow (`←`), registered once at
/// startup the way the original `goLCD20x4` driver's special-character table
/// does.
pub const LEFT_ARROW: char = '\u{2190}';
/// Custom CGRAM glyph slot for the right arrow (`→`).
pub const RIGHT_ARROW: char = '\u{2192}';

/// A blocking 20×4 character display. Rows are numbered 1..=4 to match the
/// controller's own convention.
pub trait Lcd {
    /// Writes `text` to `row` (1-indexed), left-aligned, padded/truncated to
    /// [`COLUMNS`].
    fn write_line(&mut self, row: u8, text: &str);

    /// Writes `text` to `row`, centered within [`COLUMNS`] and
    /// space-padded on both sides.
    fn write_line_centered(&mut self, row: u8, text: &str) {
        self.write_line(row, &center(text));
    }

    /// Clears all four lines.
    fn clear(&mut self) {
        for row in 1..=ROWS as u8 {
            self.write_line(row, "");
        }
    }
}

/// Centers `text` within [`COLUMNS`], truncating if it doesn't fit.
pub fn center(text: &str) -> String {
    let text: &str = if text.len() > COLUMNS {
        &text[..COLUMNS]
    } else {
        text
    };
    let pad = COLUMNS - text.len();
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

/// Builds the fourth menu line: `← <left-label>  <right-label> →`, exactly
/// 20 columns. `left`/`right` must already be padded
/// to 7 characters by the caller (the menu model does this on insertion).
pub fn adjustments_line(left: &str, right: &str) -> String {
    format!("{LEFT_ARROW} {left}  {right} {RIGHT_ARROW}")
}

cfg_if! {
    if #[cfg(feature = "rasp")] {
        use std::time::Duration;
        use rppal::gpio::{Gpio, OutputPin};

        /// Real HD44780-compatible parallel LCD driver.
        pub struct Hd44780Lcd {
            rs: OutputPin,
            en: OutputPin,
            data: [OutputPin; 8],
        }

        impl Hd44780Lcd {
            /// Creates the driver over the 11 LCD pins (rs, en, 8 data lines
            /// plus one reserved) from the fixed hardware pin map.
            pub fn new() -> Result<Self, rppal::gpio::Error> {
                let gpio = Gpio::new()?;
                Ok(Self {
                    rs: gpio.get(2)?.into_output(),
                    en: gpio.get(3)?.into_output(),
                    data: [
                        gpio.get(4)?.into_output(),
                        gpio.get(17)?.into_output(),
                        gpio.get(27)?.into_output(),
                        gpio.get(22)?.into_output(),
                        gpio.get(10)?.into_output(),
                        gpio.get(9)?.into_output(),
                        gpio.get(11)?.into_output(),
                        gpio.get(0)?.into_output(),
                    ],
                })
            }

            fn pulse_enable(&mut self) {
                self.en.set_high();
                spin_sleep::sleep(Duration::from_micros(1));
                self.en.set_low();
                spin_sleep::sleep(Duration::from_micros(50));
            }

            fn write_byte(&mut self, rs: bool, byte: u8) {
                self.rs.set(rs);
                for (i, pin) in self.data.iter_mut().enumerate() {
                    pin.set((byte >> i) & 1 == 1);
                }
                self.pulse_enable();
            }
        }

        impl Lcd for Hd44780Lcd {
            fn write_line(&mut self, row: u8, text: &str) {
                let addr = match row {
                    1 => 0x80,
                    2 => 0xC0,
                    3 => 0x94,
                    4 => 0xD4,
                    _ => return,
                };
                self.write_byte(false, addr);
                let padded = format!("{:<width$}", text, width = COLUMNS);
                for byte in padded.bytes().take(COLUMNS) {
                    self.write_byte(true, byte);
                }
            }
        }
    }
}

/// Simulated LCD: records the current text of every row for assertions in
/// tests.
#[derive(Debug, Default, Clone)]
pub struct SimLcd {
    pub rows: [String; ROWS],
}

impl SimLcd {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lcd for SimLcd {
    fn write_line(&mut self, row: u8, text: &str) {
        if let Some(slot) = (row as usize).checked_sub(1).and_then(|i| self.rows.get_mut(i)) {
            *slot = text.to_string();
        }
    }
}
