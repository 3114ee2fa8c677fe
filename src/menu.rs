//! Menu model — a circular, index-stable ring of menu items rendered
//! on the LCD, each with a single-slot, drop-on-full action channel.
//!
//! The ring is a `Vec` of slots plus
//! `prev`/`next` indices rather than a graph of owning references: the ring
//! never shrinks, so index stability is free and there's no cyclic
//! ownership to fight.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use crate::lcd::{adjustments_line, Lcd};

/// Opaque handle to a menu item, stable for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHandle(usize);

/// The two softkey actions a menu item can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Softkey 2 (button2_pressed).
    One = 1,
    /// Softkey 3 (button3_pressed).
    Two = 2,
}

struct Slot {
    name: String,
    units: String,
    values: String,
    left_label: String,
    right_label: String,
    prev: usize,
    next: usize,
    action_tx: Option<SyncSender<Action>>,
}

/// Right-pads `s` to exactly 7 characters, then truncates to 7, per
/// exactly 7 characters.
fn pad7(s: &str) -> String {
    let mut padded = format!("{s:<7}");
    padded.truncate(7);
    padded
}

/// The menu: an LCD handle, the item ring, and the current-item cursor.
pub struct Menu<L> {
    lcd: L,
    slots: Vec<Slot>,
    current: usize,
}

impl<L: Lcd> Menu<L> {
    /// Creates an empty menu over the given display.
    pub fn new(lcd: L) -> Self {
        Self {
            lcd,
            slots: Vec::new(),
            current: 0,
        }
    }

    /// Adds a menu item at the tail of the ring. The first item added
    /// becomes current and triggers a repaint.
    pub fn add_item(
        &mut self,
        name: impl Into<String>,
        units: impl Into<String>,
        values: impl Into<String>,
        left_label: &str,
        right_label: &str,
    ) -> ItemHandle {
        let idx = self.slots.len();
        let slot = Slot {
            name: name.into(),
            units: units.into(),
            values: values.into(),
            left_label: pad7(left_label),
            right_label: pad7(right_label),
            prev: idx,
            next: idx,
            action_tx: None,
        };
        self.slots.push(slot);

        if idx == 0 {
            self.current = 0;
        } else {
            let first = 0;
            let last_before = self.slots[first].prev;
            self.slots[last_before].next = idx;
            self.slots[idx].prev = last_before;
            self.slots[idx].next = first;
            self.slots[first].prev = idx;
        }

        if self.slots.len() == 1 {
            self.repaint();
        }

        ItemHandle(idx)
    }

    /// Attaches a bounded, single-slot action channel to `handle`. Each item
    /// has at most one consumer; emitting when no consumer is attached, or
    /// when the single slot is already full, drops the event silently
    /// silently.
    pub fn add_action(&mut self, handle: ItemHandle) -> Receiver<Action> {
        let (tx, rx) = sync_channel(1);
        self.slots[handle.0].action_tx = Some(tx);
        rx
    }

    fn emit(&self, action: Action) {
        if let Some(tx) = &self.slots[self.current].action_tx {
            let _ = tx.try_send(action);
        }
    }

    /// Softkey 1: move to the previous item, repaint. The debounce sleep
    /// that brackets this call lives in the dispatcher, which holds
    /// `menu_busy_flag` for its duration.
    pub fn button1_pressed(&mut self) {
        self.current = self.slots[self.current].prev;
        self.repaint();
    }

    /// Softkey 2: emit [`Action::One`] on the current item.
    pub fn button2_pressed(&mut self) {
        self.emit(Action::One);
    }

    /// Softkey 3: emit [`Action::Two`] on the current item.
    pub fn button3_pressed(&mut self) {
        self.emit(Action::Two);
    }

    /// Softkey 4: move to the next item, repaint. See [`Menu::button1_pressed`]
    /// for where the debounce sleep happens.
    pub fn button4_pressed(&mut self) {
        self.current = self.slots[self.current].next;
        self.repaint();
    }

    /// Repaints the four LCD lines for the current item.
    pub fn repaint(&mut self) {
        let slot = &self.slots[self.current];
        let line4 = adjustments_line(&slot.left_label, &slot.right_label);
        self.lcd.write_line_centered(1, &slot.name);
        self.lcd.write_line_centered(2, &slot.units);
        self.lcd.write_line_centered(3, &slot.values);
        self.lcd.write_line(4, &line4);
    }

    /// Overwrites the `values` line of `handle` and repaints if it is
    /// currently displayed. Used by menu handlers that adjust a percentage
    /// (speed, travel, constant-speed) and need to reflect the new value.
    pub fn set_values(&mut self, handle: ItemHandle, values: impl Into<String>) {
        self.slots[handle.0].values = values.into();
        if handle.0 == self.current {
            self.repaint();
        }
    }

    /// Direct access to the LCD, for the "please home the device" hint.
    pub fn lcd_mut(&mut self) -> &mut L {
        &mut self.lcd
    }

    /// Number of items in the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no items.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
