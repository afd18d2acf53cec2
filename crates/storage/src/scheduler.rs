//! Cleanup Scheduler (C4): the background task that drives periodic
//! [`LoadSampler::advance`] ticks and invokes a caller-supplied sweep when
//! the sampler reports an off-peak window.
//!
//! The scheduler is a single long-lived task that owns its cycle timer and
//! exits on a shutdown signal; it needs no synchronization beyond the load
//! sampler's own lock (§9, "Background task").

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

use crate::sampler::LoadSampler;

/// Where the scheduler's state machine currently sits. Exposed for tests
/// and diagnostics; the loop itself only needs the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next cycle boundary.
    Idle,
    /// Advancing the load sampler for the slot that just closed.
    Sampling,
    /// Running the caller-supplied cleanup synchronously.
    Sweeping,
}

/// Tunable cadence for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Duration between ticks.
    pub cycle: Duration,
    /// Minimum ticks between sweeps, once off-peak is observed.
    pub period: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            cycle: Duration::from_secs(60),
            period: 10,
        }
    }
}

/// A handle used to signal the background task to stop.
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    /// Request the scheduler loop to exit at its next wakeup.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// Start the cleanup scheduler on its own thread.
///
/// `cleanup` is invoked synchronously from the scheduler's thread whenever
/// an off-peak tick is observed after at least `period` ticks have elapsed
/// since the last sweep (or since startup). A cleanup error is logged and
/// swallowed; the loop never aborts because of it.
pub fn start<F>(
    config: SchedulerConfig,
    sampler: Arc<LoadSampler>,
    cleanup: F,
) -> (JoinHandle<()>, ShutdownHandle)
where
    F: Fn() -> Result<(), stratakv_core::Error> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("stratakv-cleaner".to_string())
        .spawn(move || {
            let mut ticks_since_sweep: u32 = 0;
            loop {
                match rx.recv_timeout(config.cycle) {
                    Ok(()) => return,
                    Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                ticks_since_sweep += 1;
                // Idle -> Sampling
                let off_peak = sampler.advance();
                if off_peak && ticks_since_sweep > config.period {
                    ticks_since_sweep = 0;
                    // Sampling -> Sweeping
                    if let Err(err) = cleanup() {
                        warn!(error = %err, "cleanup sweep failed; scheduler continues");
                    }
                }
                // Sweeping/Sampling -> Idle (implicit: loop back to recv_timeout)
            }
        })
        .unwrap_or_else(|err| {
            error!(error = %err, "failed to spawn cleanup scheduler thread");
            panic!("cleanup scheduler thread spawn failed: {err}");
        });

    (handle, ShutdownHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn shutdown_stops_the_loop_promptly() {
        let sampler = Arc::new(LoadSampler::new());
        let config = SchedulerConfig {
            cycle: Duration::from_secs(10),
            period: 0,
        };
        let (handle, shutdown) = start(config, sampler, || Ok(()));
        shutdown.shutdown();
        let start = std::time::Instant::now();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn off_peak_ticks_beyond_period_invoke_cleanup() {
        let sampler = Arc::new(LoadSampler::new());
        let config = SchedulerConfig {
            cycle: Duration::from_millis(20),
            period: 1,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let (handle, shutdown) = start(config, sampler, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        thread::sleep(Duration::from_millis(200));
        shutdown.shutdown();
        handle.join().unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn cleanup_errors_are_swallowed_not_fatal() {
        let sampler = Arc::new(LoadSampler::new());
        let config = SchedulerConfig {
            cycle: Duration::from_millis(20),
            period: 0,
        };
        let calls = Arc::new(Mutex::new(0usize));
        let calls_clone = Arc::clone(&calls);
        let (handle, shutdown) = start(config, sampler, move || {
            *calls_clone.lock().unwrap() += 1;
            Err(stratakv_core::Error::Backend("boom".into()))
        });
        thread::sleep(Duration::from_millis(150));
        shutdown.shutdown();
        handle.join().unwrap();
        assert!(*calls.lock().unwrap() >= 1);
    }
}
