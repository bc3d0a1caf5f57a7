//! ChannelStore - mutex-guarded loop table
//!
//! Critical sections must stay short: field reads and writes only, no I/O and
//! no awaits while the guard is held.

use super::types::LoopState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Largest channel count the store accepts
pub const MAX_LOOPS: usize = 256;

/// Everything guarded by the store lock
#[derive(Debug)]
pub struct ChannelTable {
    loops: HashMap<usize, LoopState>,
    channel_count: usize,
}

impl ChannelTable {
    fn new() -> Self {
        Self {
            loops: HashMap::new(),
            channel_count: 1,
        }
    }

    /// Loop record for `index`, created with zero defaults if missing
    pub fn get_or_create(&mut self, index: usize) -> &mut LoopState {
        self.loops.entry(index).or_default()
    }

    /// Loop record for `index` if it was ever referenced
    pub fn get(&self, index: usize) -> Option<&LoopState> {
        self.loops.get(&index)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Clamped to [`MAX_LOOPS`]
    pub fn set_channel_count(&mut self, count: usize) {
        self.channel_count = count.min(MAX_LOOPS);
    }

    /// Whether `index` is inside the currently announced channel range
    pub fn in_range(&self, index: usize) -> bool {
        index < self.channel_count
    }
}

/// Consistent copy of the table, taken in one critical section
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub channel_count: usize,
    /// One entry per index in `0..channel_count`
    pub loops: Vec<LoopState>,
}

/// Shared handle to the loop table
#[derive(Debug, Clone)]
pub struct ChannelStore {
    inner: Arc<Mutex<ChannelTable>>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelTable::new())),
        }
    }

    /// Run `f` with the lock held
    ///
    /// The guard is dropped on every exit path, unwinding included, and the
    /// lock is never poisoned.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut ChannelTable) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Copy of the loop record for `index`, creating it if missing
    pub fn get_or_create(&self, index: usize) -> LoopState {
        self.with_lock(|t| *t.get_or_create(index))
    }

    pub fn channel_count(&self) -> usize {
        self.with_lock(|t| t.channel_count())
    }

    pub fn set_channel_count(&self, count: usize) {
        self.with_lock(|t| t.set_channel_count(count));
    }

    /// Channel count plus every announced loop, read under one lock
    pub fn snapshot(&self) -> Snapshot {
        self.with_lock(|t| {
            let channel_count = t.channel_count();
            let loops = (0..channel_count)
                .map(|i| t.get(i).copied().unwrap_or_default())
                .collect();
            Snapshot {
                channel_count,
                loops,
            }
        })
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::thread;

    #[test]
    fn test_defaults() {
        let store = ChannelStore::new();
        assert_eq!(store.channel_count(), 1);
        assert_eq!(store.get_or_create(5), LoopState::default());
        // Referencing an index creates it but does not widen the channel range
        assert_eq!(store.channel_count(), 1);
        assert!(store.with_lock(|t| t.get(5).is_some()));
        assert!(store.with_lock(|t| t.get(6).is_none()));
    }

    #[test]
    fn test_mutation_through_lock() {
        let store = ChannelStore::new();
        store.with_lock(|t| {
            let ls = t.get_or_create(0);
            ls.state = 2;
            ls.gain = 0.5;
        });
        let ls = store.get_or_create(0);
        assert_eq!(ls.state, 2);
        assert_eq!(ls.gain, 0.5);
    }

    #[test]
    fn test_snapshot_follows_channel_count() {
        let store = ChannelStore::new();
        store.set_channel_count(3);
        store.with_lock(|t| t.get_or_create(2).loop_pos = 0.75);

        let snap = store.snapshot();
        assert_eq!(snap.channel_count, 3);
        assert_eq!(snap.loops.len(), 3);
        assert_eq!(snap.loops[2].loop_pos, 0.75);

        store.set_channel_count(1);
        assert_eq!(store.snapshot().loops.len(), 1);
    }

    #[test]
    fn test_snapshot_does_not_create_records() {
        let store = ChannelStore::new();
        store.set_channel_count(4);
        let snap = store.snapshot();
        assert_eq!(snap.loops, vec![LoopState::default(); 4]);
        assert!(store.with_lock(|t| (0..4).all(|i| t.get(i).is_none())));
    }

    #[test]
    fn test_channel_count_is_capped() {
        let store = ChannelStore::new();
        store.set_channel_count(usize::MAX);
        assert_eq!(store.channel_count(), MAX_LOOPS);
        assert_eq!(store.snapshot().loops.len(), MAX_LOOPS);
    }

    #[test]
    fn test_lock_released_after_panic() {
        let store = ChannelStore::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            store.with_lock(|t| {
                t.get_or_create(0).state = 9;
                panic!("boom");
            })
        }));
        assert!(result.is_err());

        // Lock is free again and the partial write is visible
        assert_eq!(store.get_or_create(0).state, 9);
    }

    #[test]
    fn test_no_torn_reads_under_concurrency() {
        let store = ChannelStore::new();
        store.set_channel_count(2);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for k in 0..500 {
                        let v = (w * 1000 + k) as i32;
                        let channel = (k % 2) as usize;
                        store.with_lock(|t| {
                            let ls = t.get_or_create(channel);
                            ls.state = v;
                            ls.next_state = v;
                            ls.loop_pos = v as f32;
                            ls.in_peak = v as f32;
                            ls.out_peak = v as f32;
                            ls.gain = v as f32;
                        });
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        for ls in store.snapshot().loops {
                            let v = ls.state;
                            assert_eq!(ls.next_state, v);
                            assert_eq!(ls.loop_pos, v as f32);
                            assert_eq!(ls.in_peak, v as f32);
                            assert_eq!(ls.out_peak, v as f32);
                            assert_eq!(ls.gain, v as f32);
                        }
                    }
                })
            })
            .collect();

        for h in writers.into_iter().chain(readers) {
            h.join().unwrap();
        }
    }
}
