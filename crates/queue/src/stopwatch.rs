use crate::clock::{Clock, MonotonicClock};
use std::time::Duration;

/// Pausable elapsed-time accumulator. `stop` adds the running segment to the
/// total; `start` opens a new segment without clearing it.
#[derive(Debug, Clone)]
pub struct Stopwatch<C: Clock = MonotonicClock> {
    clock: C,
    accumulated: Duration,
    started_at: Option<Duration>,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new(MonotonicClock::default())
    }
}

impl<C: Clock> Stopwatch<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            accumulated: Duration::ZERO,
            started_at: None,
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started_at = None;
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += self.clock.now().saturating_sub(started_at);
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        let running = self
            .started_at
            .map(|started_at| self.clock.now().saturating_sub(started_at))
            .unwrap_or_default();
        self.accumulated + running
    }
}
