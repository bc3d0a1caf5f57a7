//! OSC message codec
//!
//! Converts between wire bytes and a small closed argument model (`Int`,
//! `Float`, `Str`). The conversion table lives in [`Arg::from_osc`]: wider
//! numeric types are narrowed here so the rest of the crate never sees them.
//! The codec does no address interpretation (see [`address`] for that).

pub mod address;

use rosc::{OscMessage, OscPacket, OscType};
use std::fmt;
use thiserror::Error;

/// Codec failures. Always reported to the caller, never logged here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Bytes are not a valid OSC packet
    #[error("malformed OSC frame: {0}")]
    Malformed(String),

    /// Packet decoded but carries an argument type outside the supported set
    #[error("unsupported OSC argument '{tag}' at position {position}")]
    UnsupportedArgument { position: usize, tag: &'static str },

    /// A bundle reached an entry point that expects a single message
    #[error("expected a single OSC message, got a bundle of {0} element(s)")]
    UnexpectedBundle(usize),

    /// Encoder rejected the message
    #[error("failed to encode OSC message: {0}")]
    Encode(String),
}

/// A protocol argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Arg {
    /// Unwrap an OSC argument through the conversion table.
    ///
    /// `d` (f64) narrows to `Float`, `h` (i64) narrows to `Int` when it fits.
    /// Everything else is rejected.
    fn from_osc(position: usize, arg: OscType) -> Result<Self, CodecError> {
        match arg {
            OscType::Int(v) => Ok(Arg::Int(v)),
            OscType::Float(v) => Ok(Arg::Float(v)),
            OscType::Double(v) => Ok(Arg::Float(v as f32)),
            OscType::Long(v) => i32::try_from(v)
                .map(Arg::Int)
                .map_err(|_| CodecError::UnsupportedArgument { position, tag: "h" }),
            OscType::String(s) => Ok(Arg::Str(s)),
            other => Err(CodecError::UnsupportedArgument {
                position,
                tag: osc_tag(&other),
            }),
        }
    }

    fn into_osc(self) -> OscType {
        match self {
            Arg::Int(v) => OscType::Int(v),
            Arg::Float(v) => OscType::Float(v),
            Arg::Str(s) => OscType::String(s),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as `f32`; integers are accepted and converted
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Arg::Float(v) => Some(*v),
            Arg::Int(v) => Some(*v as f32),
            Arg::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "{}", v),
            Arg::Float(v) => write!(f, "{:.6}", v),
            Arg::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

/// Address plus typed arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub addr: String,
    pub args: Vec<Arg>,
}

impl Message {
    pub fn new(addr: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            addr: addr.into(),
            args,
        }
    }

    fn from_osc(msg: OscMessage) -> Result<Self, CodecError> {
        let args = msg
            .args
            .into_iter()
            .enumerate()
            .map(|(i, a)| Arg::from_osc(i, a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            addr: msg.addr,
            args,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.addr)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, "]")
    }
}

/// Encode one message into a UDP payload
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let packet = OscPacket::Message(OscMessage {
        addr: msg.addr.clone(),
        args: msg.args.iter().cloned().map(Arg::into_osc).collect(),
    });
    rosc::encoder::encode(&packet).map_err(|e| CodecError::Encode(format!("{:?}", e)))
}

/// Decode exactly one message
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    match decode_osc(bytes)? {
        OscPacket::Message(msg) => Message::from_osc(msg),
        OscPacket::Bundle(bundle) => Err(CodecError::UnexpectedBundle(bundle.content.len())),
    }
}

/// Decode a datagram, flattening bundles (depth-first, in order)
///
/// The whole datagram fails if any contained message fails.
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<Message>, CodecError> {
    let mut out = Vec::new();
    flatten(decode_osc(bytes)?, &mut out)?;
    Ok(out)
}

fn decode_osc(bytes: &[u8]) -> Result<OscPacket, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Malformed("empty datagram".to_string()));
    }
    rosc::decoder::decode_udp(bytes)
        .map(|(_, packet)| packet)
        .map_err(|e| CodecError::Malformed(format!("{:?}", e)))
}

fn flatten(packet: OscPacket, out: &mut Vec<Message>) -> Result<(), CodecError> {
    match packet {
        OscPacket::Message(msg) => out.push(Message::from_osc(msg)?),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out)?;
            }
        }
    }
    Ok(())
}

fn osc_tag(arg: &OscType) -> &'static str {
    match arg {
        OscType::Int(_) => "i",
        OscType::Float(_) => "f",
        OscType::String(_) => "s",
        OscType::Blob(_) => "b",
        OscType::Time(_) => "t",
        OscType::Long(_) => "h",
        OscType::Double(_) => "d",
        OscType::Char(_) => "c",
        OscType::Color(_) => "r",
        OscType::Midi(_) => "m",
        OscType::Bool(true) => "T",
        OscType::Bool(false) => "F",
        OscType::Array(_) => "[",
        OscType::Nil => "N",
        OscType::Inf => "I",
    }
}
