//! Time sources for the timing loop.
//!
//! The timing loop never reads the clock directly; it goes through a
//! [`TimeSource`], so tests can substitute a deterministic clock for the
//! system one. [`WallClock`] is the production source, [`SimulatedClock`]
//! the deterministic one.

use core::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

/// A point on the tick timeline: seconds since the time source's epoch.
///
/// [`WallClock`] uses the UNIX epoch; [`SimulatedClock`] starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Tick(f64);

impl Tick {
    /// Creates a tick from raw seconds.
    #[inline]
    #[must_use]
    pub const fn from_seconds(value: f64) -> Self {
        Self(value)
    }

    /// Returns the underlying seconds value.
    #[inline]
    #[must_use]
    pub const fn seconds(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clock and sleep provider for the timing loop.
///
/// Implementations must be safe to share across threads: the timing loop
/// sleeps and samples on its own thread while callers may read the clock
/// from theirs.
pub trait TimeSource: Send + Sync {
    /// Samples the current time.
    fn now(&self) -> Tick;

    /// Suspends the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Production time source: UNIX-epoch timestamps and real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> Tick {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Tick::from_seconds(since_epoch.as_secs_f64())
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// State behind the simulated clock's gate.
struct GateState {
    /// Simulated seconds since construction.
    now: f64,
    /// Sleeps the clock will currently let through.
    permits: u64,
    /// Once set, all sleeps pass without consuming permits.
    open: bool,
}

/// Deterministic time source for tests.
///
/// Starts at second zero. Every [`TimeSource::sleep`] advances the clock by
/// exactly the requested duration and returns immediately - once the gate
/// lets it through. The gate starts closed: each `sleep` consumes one permit
/// granted via [`grant`], and blocks until one is available. This gives a
/// test exact control over how many ticks the timing loop produces.
///
/// [`release`] opens the gate permanently. A metronome whose loop is parked
/// in a gated `sleep` cannot observe its stop signal, so tests must call
/// `release` (or grant a spare permit) before closing the metronome.
///
/// [`grant`]: SimulatedClock::grant
/// [`release`]: SimulatedClock::release
pub struct SimulatedClock {
    state: Mutex<GateState>,
    gate: Condvar,
}

impl SimulatedClock {
    /// Creates a clock at second zero with the gate closed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                now: 0.0,
                permits: 0,
                open: false,
            }),
            gate: Condvar::new(),
        }
    }

    /// Lets `count` further sleep calls through the gate.
    pub fn grant(&self, count: u64) {
        let mut state = self.state.lock();
        state.permits += count;
        drop(state);
        self.gate.notify_all();
    }

    /// Opens the gate permanently; all sleeps pass from here on.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.open = true;
        drop(state);
        self.gate.notify_all();
    }

    /// Current simulated time in seconds.
    #[must_use]
    pub fn now_seconds(&self) -> f64 {
        self.state.lock().now
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SimulatedClock {
    fn now(&self) -> Tick {
        Tick::from_seconds(self.state.lock().now)
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        while !state.open && state.permits == 0 {
            self.gate.wait(&mut state);
        }
        if !state.open {
            state.permits -= 1;
        }
        state.now += duration.as_secs_f64();
    }
}
