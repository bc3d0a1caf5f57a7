//! Button indicator evaluation
//!
//! Record, overdub and mute each light up from the loop's current state code
//! and blink while the engine reports a pending transition in `next_state`.

/// Visual status of a loop button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStatus {
    Off,
    On,
    /// Engine is about to enter the button's state
    PendingOn,
    /// Engine is about to leave the button's state
    PendingOff,
}

/// A loop button and the state codes it reflects
pub struct ButtonDef {
    pub label: &'static str,
    /// State codes in which the button is lit
    pub on_states: &'static [i32],
    pending_on: fn(i32, i32) -> bool,
    pending_off: fn(i32, i32) -> bool,
}

/// Loop state codes reported by the engine
pub mod codes {
    pub const OFF: i32 = 0;
    pub const WAIT_START: i32 = 1;
    pub const RECORDING: i32 = 2;
    pub const WAIT_STOP: i32 = 3;
    pub const PLAYING: i32 = 4;
    pub const OVERDUBBING: i32 = 5;
    pub const MUTED: i32 = 10;
    pub const OFF_MUTED: i32 = 20;
    /// `next_state` when nothing is scheduled
    pub const NONE: i32 = -1;
}

use codes::*;

const RECORD_ON: &[i32] = &[RECORDING, WAIT_STOP];
const MUTE_ON: &[i32] = &[MUTED, OFF_MUTED];

/// Membership test over a list of state codes
pub fn contains_int(values: &[i32], value: i32) -> bool {
    values.iter().any(|v| *v == value)
}

fn record_pending_on(state: i32, next: i32) -> bool {
    state == WAIT_START && (next == PLAYING || next == NONE)
}

fn record_pending_off(state: i32, next: i32) -> bool {
    contains_int(RECORD_ON, state) && next == PLAYING
}

fn overdub_pending_on(state: i32, next: i32) -> bool {
    state == PLAYING && next == OVERDUBBING
}

fn overdub_pending_off(state: i32, next: i32) -> bool {
    state == OVERDUBBING && next == PLAYING
}

fn mute_pending_on(state: i32, next: i32) -> bool {
    state == PLAYING && next == MUTED
}

fn mute_pending_off(state: i32, next: i32) -> bool {
    contains_int(MUTE_ON, state) && next == PLAYING
}

pub const RECORD: ButtonDef = ButtonDef {
    label: "Rec",
    on_states: RECORD_ON,
    pending_on: record_pending_on,
    pending_off: record_pending_off,
};

pub const OVERDUB: ButtonDef = ButtonDef {
    label: "Dub",
    on_states: &[OVERDUBBING],
    pending_on: overdub_pending_on,
    pending_off: overdub_pending_off,
};

pub const MUTE: ButtonDef = ButtonDef {
    label: "Mute",
    on_states: MUTE_ON,
    pending_on: mute_pending_on,
    pending_off: mute_pending_off,
};

/// Buttons in display order
pub const BUTTONS: [ButtonDef; 3] = [RECORD, OVERDUB, MUTE];

impl ButtonDef {
    /// Pending transitions win over the steady state
    pub fn status(&self, state: i32, next_state: i32) -> ButtonStatus {
        if (self.pending_on)(state, next_state) {
            ButtonStatus::PendingOn
        } else if (self.pending_off)(state, next_state) {
            ButtonStatus::PendingOff
        } else if contains_int(self.on_states, state) {
            ButtonStatus::On
        } else {
            ButtonStatus::Off
        }
    }
}
