//! Load Sampler (C3): a fixed-window request-cost histogram that produces an
//! off-peak signal for the cleanup scheduler.
//!
//! A ring of 100 counters records the cost of every completed call. Once a
//! cycle boundary is reached, [`LoadSampler::advance`] folds the window
//! closed: it reports whether the just-finished slot was off-peak relative
//! to the median of prior complete slots, then rotates to a fresh slot.

use parking_lot::Mutex;

/// Number of ring slots. Matches the source algorithm's `recordCount`.
const SLOTS: usize = 100;

struct Ring {
    records: [i64; SLOTS],
    cur: usize,
    /// Set once the cursor has wrapped past the end of the ring at least once.
    wrapped: bool,
}

/// Concurrent-safe fixed-window cost histogram.
///
/// ```
/// use stratakv_storage::sampler::LoadSampler;
///
/// let sampler = LoadSampler::new();
/// sampler.record(5);
/// sampler.record(3);
/// // Before any slot has completed, the detector reports no off-peak signal.
/// assert!(!sampler.advance());
/// ```
pub struct LoadSampler {
    ring: Mutex<Ring>,
}

impl LoadSampler {
    /// Construct an empty sampler, cursor at slot 0.
    pub fn new() -> Self {
        LoadSampler {
            ring: Mutex::new(Ring {
                records: [0; SLOTS],
                cur: 0,
                wrapped: false,
            }),
        }
    }

    /// Atomically add `cost` to the current slot.
    ///
    /// Safe under arbitrarily many concurrent callers; the critical section
    /// is a single integer addition.
    pub fn record(&self, cost: i64) {
        let mut ring = self.ring.lock();
        ring.records[ring.cur] += cost;
    }

    /// Report the off-peak signal for the slot about to close, then rotate
    /// the cursor and zero the new current slot.
    ///
    /// Off-peak test: with fewer than one complete slot, always `false`.
    /// Otherwise, the median of every complete slot (every slot but the
    /// current one, bounded by the highest index ever written) is compared
    /// against the current slot; off-peak iff the current slot is not more
    /// than twice that median.
    pub fn advance(&self) -> bool {
        let mut ring = self.ring.lock();
        let off_peak = is_off_peak(&ring.records, ring.cur, ring.wrapped);
        ring.cur += 1;
        if ring.cur == SLOTS {
            ring.cur = 0;
            ring.wrapped = true;
        }
        ring.records[ring.cur] = 0;
        off_peak
    }

    /// Sum of every slot; mainly useful for tests and diagnostics.
    #[cfg(test)]
    fn slot(&self, idx: usize) -> i64 {
        self.ring.lock().records[idx]
    }
}

impl Default for LoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Off-peak iff the current slot does NOT exceed twice the median of the
/// complete slots. With fewer than one complete slot, the test has no
/// history to judge against and reports not-off-peak (§4.3).
fn is_off_peak(records: &[i64; SLOTS], cur: usize, wrapped: bool) -> bool {
    if !wrapped && cur < 1 {
        return false;
    }
    let mut complete: Vec<i64> = records[..cur].to_vec();
    if wrapped {
        complete.extend_from_slice(&records[cur + 1..]);
    }
    complete.sort_unstable();
    let median = complete[complete.len() / 2];
    records[cur] <= median * 2
}
