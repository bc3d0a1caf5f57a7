//! Inbound dispatcher - routes decoded OSC messages into the channel store
//!
//! Every inbound message is first classified into an [`Inbound`] variant
//! (address shape plus fully validated arguments) without touching the store.
//! Only then is the variant applied, in one short critical section.
//!
//! Applying is order independent: each variant overwrites exactly one field,
//! so replays are idempotent and out-of-order delivery across fields is safe.

use crate::osc::address::{parse_gain_address, parse_update_address, Control, GainAddress, UpdateAddress, PONG};
use crate::osc::{Arg, Message};
use crate::state::{ChannelStore, ChannelTable, MAX_LOOPS};
use tracing::{debug, trace};

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Gain written by the auxiliary endpoint (0-based index)
    Gain { index: usize, value: f32 },
    /// Handshake reply announcing the number of loops
    ChannelCount(usize),
    /// `update_<control>` push or poll reply
    Control {
        index: usize,
        control: Control,
        value: f32,
    },
    /// Unknown address or cross-talk; dropped silently
    Ignored,
    /// Known address with unusable arguments
    Malformed(String),
}

/// What applying a variant did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    ChannelCount(usize),
    /// Index outside the announced channel range
    OutOfRange,
    Skipped,
}

/// Classify a message by address shape and argument schema
pub fn classify(msg: &Message) -> Inbound {
    match parse_gain_address(&msg.addr) {
        GainAddress::Index(index) => return classify_gain(index, &msg.args),
        GainAddress::BadId => {
            return Inbound::Malformed(format!("non-numeric strip id in '{}'", msg.addr))
        }
        GainAddress::NotGain => {}
    }

    if msg.addr == PONG {
        return classify_pong(&msg.args);
    }

    match parse_update_address(&msg.addr) {
        UpdateAddress::Loop { index, control } => classify_update(index, control, &msg.args),
        UpdateAddress::BadIndex(control) => {
            Inbound::Malformed(format!("no loop index in '{}' ({})", msg.addr, control))
        }
        UpdateAddress::NotUpdate => Inbound::Ignored,
    }
}

fn classify_gain(index: usize, args: &[Arg]) -> Inbound {
    match args {
        [Arg::Float(value)] => Inbound::Gain {
            index,
            value: *value,
        },
        _ => Inbound::Malformed(format!("gain expects one float, got {:?}", args)),
    }
}

fn classify_pong(args: &[Arg]) -> Inbound {
    match args.get(2) {
        Some(Arg::Int(n)) if *n >= 0 && *n as usize <= MAX_LOOPS => {
            Inbound::ChannelCount(*n as usize)
        }
        Some(Arg::Int(n)) if *n > 0 => {
            Inbound::Malformed(format!("pong loop count {} exceeds {}", n, MAX_LOOPS))
        }
        Some(other) => Inbound::Malformed(format!("pong loop count is not a count: {:?}", other)),
        None => Inbound::Malformed(format!("pong carries {} argument(s), need 3", args.len())),
    }
}

fn classify_update(index: usize, control: Control, args: &[Arg]) -> Inbound {
    let [Arg::Int(embedded), Arg::Str(name), value] = args else {
        return Inbound::Malformed(format!(
            "update_{} expects [int, string, float], got {:?}",
            control, args
        ));
    };
    let Some(value) = value.as_f32() else {
        return Inbound::Malformed(format!("update_{} value is not numeric", control));
    };

    // Interleaved replies for another loop or control are expected, not errors
    if *embedded < 0 || *embedded as usize != index || name != control.name() {
        return Inbound::Ignored;
    }

    Inbound::Control {
        index,
        control,
        value,
    }
}

/// Apply a classified message to the table (caller holds the lock)
pub fn apply(table: &mut ChannelTable, inbound: Inbound) -> Applied {
    match inbound {
        Inbound::Gain { index, value } => {
            if !table.in_range(index) {
                return Applied::OutOfRange;
            }
            table.get_or_create(index).gain = value;
            Applied::Updated
        }
        Inbound::ChannelCount(n) => {
            table.set_channel_count(n);
            Applied::ChannelCount(n)
        }
        Inbound::Control {
            index,
            control,
            value,
        } => {
            if !table.in_range(index) {
                return Applied::OutOfRange;
            }
            let ls = table.get_or_create(index);
            match control {
                Control::State => ls.state = value as i32,
                Control::NextState => ls.next_state = value as i32,
                Control::LoopPos => ls.loop_pos = value,
                Control::InPeakMeter => ls.in_peak = value,
                Control::OutPeakMeter => ls.out_peak = value,
                Control::Wet => ls.gain = value,
            }
            Applied::Updated
        }
        Inbound::Ignored | Inbound::Malformed(_) => Applied::Skipped,
    }
}

/// Classify and apply one message
///
/// Never fails: malformed messages are logged at debug level, stale and
/// unknown ones are dropped without a trace.
pub fn dispatch(store: &ChannelStore, msg: &Message) -> Applied {
    let inbound = classify(msg);
    if let Inbound::Malformed(reason) = &inbound {
        debug!("Dropping malformed OSC message {}: {}", msg.addr, reason);
        return Applied::Skipped;
    }

    let applied = store.with_lock(|t| apply(t, inbound));
    if let Applied::ChannelCount(n) = applied {
        debug!("Engine reports {} loop(s)", n);
    } else {
        trace!(addr = %msg.addr, ?applied, "OSC dispatched");
    }
    applied
}

#[cfg(test)]
mod tests;
