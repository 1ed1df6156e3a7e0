//! Metronome runtime: a single-producer periodic tick source.
//!
//! # Architecture
//!
//! A [`Metronome`] owns one background thread, the timing loop. Each
//! iteration sleeps for the configured period, samples the time source, and
//! enqueues the sample on the tick queue. Consumers call [`Metronome::get`]
//! from their own threads; the queue is a work queue, so concurrent
//! consumers each receive distinct ticks in production order.
//!
//! The loop sleeps for a fixed period relative to the previous iteration
//! rather than targeting absolute deadlines, so cumulative drift grows with
//! scheduling jitter over long runs. Callers that need epoch-aligned ticks
//! should resynchronize externally.
//!
//! # Lifecycle
//!
//! Constructed stopped. [`start`](Metronome::start) spawns the timing loop
//! and may be called exactly once; a second call fails with
//! [`MetronomeError::ProtocolViolation`]. [`close`](Metronome::close)
//! signals the loop, waits for the thread to exit, and leaves the instance
//! in a terminal stopped state; closing before starting, or twice, is a
//! no-op. Dropping an open metronome performs the same signal-and-join, so
//! the worker cannot outlive the object on any exit path.
//!
//! Shutdown is cooperative: the loop checks the stop signal once per
//! iteration and sleeps are never interrupted, so `close` returns within
//! one period plus the time of one enqueue.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use metronome::{Metronome, MetronomeConfig};
//!
//! let config = MetronomeConfig::default().with_period(Duration::from_secs(1));
//! let mut ticker = Metronome::new(config)?;
//! ticker.start()?;
//!
//! for _ in 0..10 {
//!     let t = ticker.get();
//!     println!("tick at {t}");
//! }
//!
//! ticker.close();
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::queue::TickQueue;
use crate::time::{Tick, TimeSource, WallClock};
use crate::trace::{debug, info};

/// Configuration for a metronome.
pub struct MetronomeConfig {
    /// Interval between successive ticks. Must be greater than zero.
    pub period: Duration,
    /// Diagnostics label; names the timing-loop thread.
    pub name: String,
    /// Tick queue bound. `None` means unbounded. When the bound is reached,
    /// newly produced ticks are dropped; the producer never blocks.
    pub capacity: Option<NonZeroUsize>,
    /// Clock and sleep provider for the timing loop.
    pub time_source: Arc<dyn TimeSource>,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            name: "metronome".to_string(),
            capacity: None,
            time_source: Arc::new(WallClock),
        }
    }
}

impl MetronomeConfig {
    /// Builder-style setter for the tick period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Builder-style setter for the diagnostics label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder-style setter for the tick queue bound.
    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<NonZeroUsize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder-style setter for the time source.
    #[must_use]
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }
}

/// Error constructing or operating a metronome.
#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    /// Rejected configuration, e.g. a zero period.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Lifecycle misuse, e.g. a second `start` on the same instance.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

/// The timing loop state, run on the worker thread.
struct TickLoop {
    period: Duration,
    time_source: Arc<dyn TimeSource>,
    queue: Arc<TickQueue>,
    stop: Arc<AtomicBool>,
}

impl TickLoop {
    /// Runs the timing loop until the stop signal is observed.
    ///
    /// Each iteration sleeps for one period, samples the time source, and
    /// enqueues the sample. A full bounded queue drops the new tick without
    /// blocking or erroring.
    fn run(&mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            self.time_source.sleep(self.period);
            let tick = self.time_source.now();
            if !self.queue.push(tick) {
                debug!(tick = tick.seconds(), depth = self.queue.len(), "tick dropped, queue full");
            }
        }
    }
}

/// A periodic tick source.
///
/// See the [module docs](self) for lifecycle and ordering guarantees.
pub struct Metronome {
    period: Duration,
    name: String,
    capacity: Option<NonZeroUsize>,
    time_source: Arc<dyn TimeSource>,
    queue: Arc<TickQueue>,
    /// Stop signal shared with the timing loop.
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("period", &self.period)
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Metronome {
    /// Creates a metronome in the stopped state. Nothing runs until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::InvalidConfiguration`] if the period is zero.
    pub fn new(config: MetronomeConfig) -> Result<Self, MetronomeError> {
        if config.period.is_zero() {
            return Err(MetronomeError::InvalidConfiguration(
                "period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period: config.period,
            name: config.name,
            capacity: config.capacity,
            time_source: config.time_source,
            queue: Arc::new(TickQueue::new(config.capacity)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            started: false,
        })
    }

    /// Creates a metronome with the given period and default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::InvalidConfiguration`] if the period is zero.
    pub fn with_period(period: Duration) -> Result<Self, MetronomeError> {
        Self::new(MetronomeConfig::default().with_period(period))
    }

    /// Launches the timing loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`MetronomeError::ProtocolViolation`] if the timing loop was
    /// already started, including after [`close`](Self::close) - the
    /// lifecycle is terminal and an instance cannot be restarted.
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn start(&mut self) -> Result<(), MetronomeError> {
        if self.started {
            return Err(MetronomeError::ProtocolViolation(
                "timing loop already started",
            ));
        }
        self.started = true;

        info!(
            name = %self.name,
            period_us = self.period.as_micros() as u64,
            capacity = ?self.capacity,
            "metronome starting"
        );

        let mut tick_loop = TickLoop {
            period: self.period,
            time_source: Arc::clone(&self.time_source),
            queue: Arc::clone(&self.queue),
            stop: Arc::clone(&self.stop),
        };

        let handle = thread::Builder::new()
            .name(format!("{}-tick", self.name))
            .spawn(move || {
                info!("tick thread started");
                tick_loop.run();
                info!("tick thread exiting");
            })
            .expect("failed to spawn tick thread");

        self.worker = Some(handle);
        Ok(())
    }

    /// Removes and returns the oldest tick, blocking until one is available.
    ///
    /// Concurrent consumers each receive distinct ticks, in production
    /// order. Note that `close` does not wake blocked consumers: a `get` on
    /// an empty queue after the loop has stopped blocks indefinitely. Use
    /// [`get_timeout`](Self::get_timeout) where that matters.
    #[must_use]
    pub fn get(&self) -> Tick {
        self.queue.pop()
    }

    /// Like [`get`](Self::get), but returns `None` if no tick arrives
    /// within `timeout`.
    #[must_use]
    pub fn get_timeout(&self, timeout: Duration) -> Option<Tick> {
        self.queue.pop_timeout(timeout)
    }

    /// Number of ticks waiting in the queue. Never consumes.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Signals the timing loop to stop and waits for its thread to exit.
    ///
    /// The loop observes the signal at its next iteration boundary, so this
    /// returns within one period plus the time of one enqueue. Ticks already
    /// queued remain retrievable. Closing a metronome that was never started,
    /// or closing twice, is a no-op.
    pub fn close(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.stop.store(true, Ordering::Relaxed);
            debug!(name = %self.name, "waiting for tick thread to exit");
            let _ = handle.join();
            info!(name = %self.name, "metronome stopped");
        }
    }

    /// The configured tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// The diagnostics label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured tick queue bound, if any.
    #[must_use]
    pub const fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }

    /// Whether the timing loop is currently running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        // Same signal-and-join as close, so early returns and panics in the
        // caller cannot leak the timing-loop thread.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimulatedClock;

    #[test]
    fn zero_period_is_rejected() {
        let config = MetronomeConfig::default().with_period(Duration::ZERO);
        let err = Metronome::new(config).unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidConfiguration(_)));
    }

    #[test]
    fn second_start_is_rejected() {
        let clock = Arc::new(SimulatedClock::new());
        let config = MetronomeConfig::default().with_time_source(clock.clone());
        let mut m = Metronome::new(config).unwrap();

        m.start().unwrap();
        let err = m.start().unwrap_err();
        assert!(matches!(err, MetronomeError::ProtocolViolation(_)));

        clock.release();
        m.close();
    }

    #[test]
    fn start_after_close_is_rejected() {
        let clock = Arc::new(SimulatedClock::new());
        let config = MetronomeConfig::default().with_time_source(clock.clone());
        let mut m = Metronome::new(config).unwrap();

        m.start().unwrap();
        clock.release();
        m.close();

        assert!(!m.is_running());
        assert!(matches!(
            m.start(),
            Err(MetronomeError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn close_without_start_and_double_close_are_noops() {
        let mut m = Metronome::with_period(Duration::from_secs(1)).unwrap();
        m.close();
        assert!(!m.is_running());

        let clock = Arc::new(SimulatedClock::new());
        let config = MetronomeConfig::default().with_time_source(clock.clone());
        let mut m = Metronome::new(config).unwrap();
        m.start().unwrap();
        clock.release();
        m.close();
        m.close();
        assert!(!m.is_running());
    }

    #[test]
    fn accessors_reflect_configuration() {
        let config = MetronomeConfig::default()
            .with_period(Duration::from_millis(250))
            .with_name("pulse")
            .with_capacity(NonZeroUsize::new(8));
        let m = Metronome::new(config).unwrap();

        assert_eq!(m.period(), Duration::from_millis(250));
        assert_eq!(m.name(), "pulse");
        assert_eq!(m.capacity(), NonZeroUsize::new(8));
        assert!(!m.is_running());
        assert_eq!(m.backlog(), 0);
    }

    #[test]
    fn queue_starts_empty_before_first_tick() {
        let clock = Arc::new(SimulatedClock::new());
        let config = MetronomeConfig::default().with_time_source(clock.clone());
        let mut m = Metronome::new(config).unwrap();

        m.start().unwrap();
        assert_eq!(m.backlog(), 0, "no tick may fire before a full period");

        clock.release();
        m.close();
    }
}
