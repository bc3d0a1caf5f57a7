//! sooper-surface - terminal control surface for SooperLooper over OSC
//!
//! The engine pushes and answers loop state over UDP; the surface mirrors it in
//! a [`state::ChannelStore`], renders it, and writes wet levels back.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod mock;
pub mod osc;
pub mod state;
pub mod surface;
pub mod sync;
pub mod transport;
