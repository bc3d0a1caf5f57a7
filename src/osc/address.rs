//! Address templates for the looper protocol
//!
//! Builders for every outbound address and the parsers the dispatcher uses to
//! recognize inbound shapes.

use std::fmt;

/// Handshake request
pub const PING: &str = "/ping";
/// Handshake reply path (also sent as the reply path of the ping)
pub const PONG: &str = "/pong";

/// Default address prefix of the looper engine
pub const DEFAULT_PREFIX: &str = "/sl";

const GAIN_HEAD: &str = "/strip/Sooper";
/// Canonical gain-control suffix (literal space)
const GAIN_TAIL: &str = "/Gain/Gain (dB)";
/// Spellings seen from other peers, accepted inbound only
const GAIN_TAIL_ALIASES: &[&str] = &["/Gain/Gain (dB)", "/Gain/Gain(dB)", "/Gain/Gain%20(dB)"];

const UPDATE_PREFIX: &str = "update_";

/// Per-loop controls mirrored by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    State,
    NextState,
    LoopPos,
    InPeakMeter,
    OutPeakMeter,
    Wet,
}

impl Control {
    pub const ALL: [Control; 6] = [
        Control::State,
        Control::NextState,
        Control::LoopPos,
        Control::InPeakMeter,
        Control::OutPeakMeter,
        Control::Wet,
    ];

    /// Controls the engine pushes on its own once registered
    pub const REGISTERED: [Control; 3] =
        [Control::LoopPos, Control::InPeakMeter, Control::OutPeakMeter];

    /// Controls re-read from the engine on every poll sweep (gain is read
    /// separately, from whichever source owns it)
    pub const POLLED: [Control; 2] = [Control::State, Control::NextState];

    /// Protocol name of the control
    pub fn name(self) -> &'static str {
        match self {
            Control::State => "state",
            Control::NextState => "next_state",
            Control::LoopPos => "loop_pos",
            Control::InPeakMeter => "in_peak_meter",
            Control::OutPeakMeter => "out_peak_meter",
            Control::Wet => "wet",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `<prefix>/<index>/register_auto_update`
pub fn register_address(prefix: &str, index: usize) -> String {
    format!("{}/{}/register_auto_update", prefix, index)
}

/// `<prefix>/<index>/get`
pub fn get_address(prefix: &str, index: usize) -> String {
    format!("{}/{}/get", prefix, index)
}

/// `<prefix>/<index>/set`
pub fn set_address(prefix: &str, index: usize) -> String {
    format!("{}/{}/set", prefix, index)
}

/// Reply path the engine should use for a control: `<prefix>/<index>/update_<control>`
pub fn update_path(prefix: &str, index: usize, control: Control) -> String {
    format!("{}/{}/{}{}", prefix, index, UPDATE_PREFIX, control.name())
}

/// Gain-control address for a 0-based loop index (the wire id is 1-based)
pub fn gain_address(index: usize) -> String {
    format!("{}{}{}", GAIN_HEAD, index + 1, GAIN_TAIL)
}

/// Outcome of matching an address against the gain-control family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainAddress {
    /// Not a gain-control address
    NotGain,
    /// Gain shape, but the id is not a positive integer
    BadId,
    /// 0-based loop index
    Index(usize),
}

/// Match `/strip/Sooper<id>/Gain/Gain (dB)` and its accepted spellings
pub fn parse_gain_address(addr: &str) -> GainAddress {
    let Some(rest) = addr.strip_prefix(GAIN_HEAD) else {
        return GainAddress::NotGain;
    };
    let Some(id) = GAIN_TAIL_ALIASES
        .iter()
        .find_map(|tail| rest.strip_suffix(tail))
    else {
        return GainAddress::NotGain;
    };

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return GainAddress::BadId;
    }
    match id.parse::<usize>() {
        Ok(n) if n >= 1 => GainAddress::Index(n - 1),
        _ => GainAddress::BadId,
    }
}

/// Outcome of matching an address against the `update_<control>` family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAddress {
    NotUpdate,
    /// Known control, but the loop segment is not a number
    BadIndex(Control),
    Loop { index: usize, control: Control },
}

/// Match `<prefix>/<index>/update_<control>`
///
/// The loop index is the path segment just before `update_<control>`; with
/// the default `/sl` prefix that is the second segment.
pub fn parse_update_address(addr: &str) -> UpdateAddress {
    let mut segments = addr.rsplit('/');
    let Some(control) = segments
        .next()
        .and_then(|last| last.strip_prefix(UPDATE_PREFIX))
        .and_then(Control::from_name)
    else {
        return UpdateAddress::NotUpdate;
    };

    match segments.next().map(str::parse::<usize>) {
        Some(Ok(index)) => UpdateAddress::Loop { index, control },
        _ => UpdateAddress::BadIndex(control),
    }
}
