//! Level control - pointer position to wet gain
//!
//! A click across the level bar is a fraction of its width. The fraction is
//! mapped on the same dB scale the meters are drawn with, so the bar fill and
//! the resulting gain agree. Two clamps keep the result under the gain ceiling:
//! one on the fraction (the fill that maps to the ceiling) and one on the
//! amplitude, because the float transform can overshoot by an epsilon.

use crate::osc::address;
use crate::osc::{Arg, Message};
use crate::state::ChannelStore;
use crate::transport::{Target, Transport};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bottom of the meter scale
pub const METER_MIN_DB: f64 = -70.0;
/// Top of the meter scale
pub const METER_MAX_DB: f64 = 0.0;

/// Highest gain the surface will ever write
pub const GAIN_CEILING: f32 = 0.921;

/// Fill whose transform is [`GAIN_CEILING`]: `(20*log10(0.921) - min) / (max - min)`
pub const FILL_CEILING: f64 = 0.989_788_465_770_528_3;

/// Amplitudes below this are drawn as silence
const SILENCE: f32 = 0.00001;

/// Fraction of a region covered by a pointer at `offset` (0 = left edge)
///
/// A region that has not been laid out yet (width 0) yields 0.
pub fn fraction_across(offset: i32, width: i32) -> f64 {
    if width <= 0 {
        return 0.0;
    }
    (offset as f64 / width as f64).clamp(0.0, 1.0)
}

/// Map a bar fraction to a gain amplitude in `[0, GAIN_CEILING]`
pub fn fraction_to_gain(fraction: f64) -> f32 {
    let fill = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0).min(FILL_CEILING)
    };
    if fill <= 0.0 {
        return 0.0;
    }

    let db = fill * (METER_MAX_DB - METER_MIN_DB) + METER_MIN_DB;
    let amplitude = 10f64.powf(db / 20.0);
    amplitude.min(GAIN_CEILING as f64) as f32
}

/// Normalized bar fill for an amplitude on a `[min_db, max_db]` scale
pub fn amplitude_to_fill(val: f32, min_db: f64, max_db: f64) -> f32 {
    if val < SILENCE {
        return 0.0;
    }
    let db = (20.0 * (val as f64).log10()).clamp(min_db, max_db);
    ((db - min_db) / (max_db - min_db)) as f32
}

/// Result of a level write
pub struct LevelWrite {
    /// Gain written locally
    pub gain: f32,
    /// Background send; the local echo does not depend on it
    pub sent: JoinHandle<()>,
}

/// Applies user level changes: local echo first, then fire-and-forget writes
#[derive(Clone)]
pub struct LevelControl {
    store: ChannelStore,
    transport: Arc<dyn Transport>,
    prefix: String,
    runtime: Handle,
}

impl LevelControl {
    /// Must be created inside the Tokio runtime; the handle is captured so
    /// blocking callers (the command prompt thread) can spawn sends.
    pub fn new(store: ChannelStore, transport: Arc<dyn Transport>, prefix: String) -> Self {
        Self {
            store,
            transport,
            prefix,
            runtime: Handle::current(),
        }
    }

    /// Set the wet level of loop `index` from a bar fraction
    pub fn set_level(&self, index: usize, fraction: f64) -> Result<LevelWrite> {
        let gain = fraction_to_gain(fraction);

        let echoed = self.store.with_lock(|t| {
            if !t.in_range(index) {
                return Err(t.channel_count());
            }
            t.get_or_create(index).gain = gain;
            Ok(())
        });
        if let Err(count) = echoed {
            bail!("Loop {} does not exist (engine reports {})", index + 1, count);
        }

        debug!("Level loop {} fraction {:.4} -> gain {:.6}", index + 1, fraction, gain);

        let transport = Arc::clone(&self.transport);
        let native = Message::new(
            address::set_address(&self.prefix, index),
            vec![Arg::from("wet"), Arg::Float(gain)],
        );
        let strip = Message::new(address::gain_address(index), vec![Arg::Float(gain)]);

        let sent = self.runtime.spawn(async move {
            if transport.has_auxiliary() {
                if let Err(e) = transport.send(Target::Auxiliary, &strip).await {
                    warn!("Gain write to auxiliary failed: {:#}", e);
                }
            }
            if let Err(e) = transport.send(Target::Engine, &native).await {
                warn!("Gain write to engine failed: {:#}", e);
            }
        });

        Ok(LevelWrite { gain, sent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;
    use proptest::prelude::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_amplitude_to_fill() {
        assert_eq!(amplitude_to_fill(0.0, -70.0, 0.0), 0.0);
        assert!((amplitude_to_fill(1.0, -70.0, 0.0) - 1.0).abs() as f64 <= TOL);

        let mid = 10f64.powf(-35.0 / 20.0) as f32;
        assert!((amplitude_to_fill(mid, -70.0, 0.0) - 0.5).abs() as f64 <= TOL);
    }

    #[test]
    fn test_amplitude_to_fill_clipping_and_ranges() {
        let below = 10f64.powf(-80.0 / 20.0) as f32;
        assert_eq!(amplitude_to_fill(below, -70.0, 0.0), 0.0);
        assert_eq!(amplitude_to_fill(2.0, -70.0, 0.0), 1.0);
        assert_eq!(amplitude_to_fill(0.000001, -70.0, 0.0), 0.0);

        let custom = 10f64.powf(-30.0 / 20.0) as f32;
        assert!((amplitude_to_fill(custom, -60.0, -20.0) - 0.75).abs() as f64 <= TOL);
    }

    #[test]
    fn test_gain_endpoints() {
        assert_eq!(fraction_to_gain(0.0), 0.0);
        assert_eq!(fraction_to_gain(-3.0), 0.0);
        assert_eq!(fraction_to_gain(f64::NAN), 0.0);

        for f in [FILL_CEILING, 0.995, 1.0, 7.5] {
            let g = fraction_to_gain(f);
            assert!(g <= GAIN_CEILING);
            assert!((g as f64 - GAIN_CEILING as f64).abs() <= TOL, "{} -> {}", f, g);
        }
    }

    #[test]
    fn test_fill_ceiling_matches_gain_ceiling() {
        let computed = (20.0 * (GAIN_CEILING as f64).log10() - METER_MIN_DB)
            / (METER_MAX_DB - METER_MIN_DB);
        assert!((computed - FILL_CEILING).abs() < 1e-6);
    }

    #[test]
    fn test_gain_is_reversible_through_fill() {
        for f in [0.1, 0.25, 0.5, 0.8, 0.95] {
            let g = fraction_to_gain(f);
            let back = amplitude_to_fill(g, METER_MIN_DB, METER_MAX_DB) as f64;
            assert!((back - f).abs() < 1e-5, "{} -> {} -> {}", f, g, back);
        }
    }

    #[test]
    fn test_fraction_across() {
        assert_eq!(fraction_across(10, 0), 0.0);
        assert_eq!(fraction_across(0, 40), 0.0);
        assert_eq!(fraction_across(20, 40), 0.5);
        assert_eq!(fraction_across(50, 40), 1.0);
        assert_eq!(fraction_across(-4, 40), 0.0);
    }

    proptest! {
        #[test]
        fn prop_gain_stays_under_ceiling(f in 0.0f64..=1.0) {
            let g = fraction_to_gain(f);
            prop_assert!((0.0..=GAIN_CEILING).contains(&g));
        }

        #[test]
        fn prop_gain_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(fraction_to_gain(lo) <= fraction_to_gain(hi));
        }
    }

    #[tokio::test]
    async fn test_set_level_echoes_and_sends() {
        let store = ChannelStore::new();
        store.set_channel_count(2);
        let transport = Arc::new(RecordingTransport::new(true));
        let level = LevelControl::new(store.clone(), transport.clone(), "/sl".to_string());

        let write = level.set_level(1, 1.0).unwrap();
        assert_eq!(write.gain, GAIN_CEILING);
        assert_eq!(store.get_or_create(1).gain, GAIN_CEILING);
        assert_eq!(store.get_or_create(0).gain, 0.0);

        write.sent.await.unwrap();
        let sent = transport.take();
        assert_eq!(
            sent,
            vec![
                (
                    Target::Auxiliary,
                    Message::new("/strip/Sooper2/Gain/Gain (dB)", vec![Arg::Float(GAIN_CEILING)])
                ),
                (
                    Target::Engine,
                    Message::new("/sl/1/set", vec![Arg::from("wet"), Arg::Float(GAIN_CEILING)])
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_level_without_auxiliary_writes_engine_only() {
        let store = ChannelStore::new();
        let transport = Arc::new(RecordingTransport::new(false));
        let level = LevelControl::new(store, transport.clone(), "/sl".to_string());

        level.set_level(0, 0.5).unwrap().sent.await.unwrap();
        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Target::Engine);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_local_echo() {
        let store = ChannelStore::new();
        let transport = Arc::new(RecordingTransport::failing());
        let level = LevelControl::new(store.clone(), transport, "/sl".to_string());

        let write = level.set_level(0, 0.5).unwrap();
        write.sent.await.unwrap();
        assert_eq!(store.get_or_create(0).gain, fraction_to_gain(0.5));
    }

    #[tokio::test]
    async fn test_set_level_rejects_unknown_loop() {
        let store = ChannelStore::new();
        let transport = Arc::new(RecordingTransport::new(false));
        let level = LevelControl::new(store.clone(), transport.clone(), "/sl".to_string());

        assert!(level.set_level(3, 0.5).is_err());
        assert!(store.with_lock(|t| t.get(3).is_none()));
        assert!(transport.take().is_empty());
    }
}
