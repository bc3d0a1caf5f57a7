//! Channel state - the mirrored per-loop model
//!
//! One [`ChannelStore`] holds every [`LoopState`] plus the channel count behind
//! a single mutex. The inbound listener, the poll task, the redraw task and the
//! level control all go through [`ChannelStore::with_lock`].

mod store;
mod types;

pub use store::{ChannelStore, ChannelTable, Snapshot, MAX_LOOPS};
pub use types::LoopState;
