use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::audio::lock;

/// Time source for the player's timers
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *lock(&self.offset)
    }
}

/// One-shot timeout that finishes a session starved of decodable data
#[derive(Debug)]
pub struct StarvationTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl StarvationTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start counting from `now` unless already counting
    pub fn arm_if_idle(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.timeout);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

/// Holds back decoding at the start of a session
///
/// Opens once the ring holds `threshold` bytes or `window` has passed since
/// the session started, and stays open afterwards.
#[derive(Debug)]
pub struct PrimingGate {
    started: Instant,
    threshold: usize,
    window: Duration,
    open: bool,
}

impl PrimingGate {
    pub fn new(started: Instant, threshold: usize, window: Duration) -> Self {
        Self {
            started,
            threshold,
            window,
            open: false,
        }
    }

    pub fn ready(&mut self, buffered: usize, now: Instant) -> bool {
        if !self.open {
            self.open = buffered >= self.threshold
                || now.saturating_duration_since(self.started) >= self.window;
        }
        self.open
    }

    pub fn is_priming(&self) -> bool {
        !self.open
    }
}
