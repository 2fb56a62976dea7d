use crate::blocking::{BlockingQueue, QueuePolicy};
use crate::clock::{Clock, MonotonicClock};
use crate::errors::{RecvError, RecvTimeoutError, SendError};
use crate::stopwatch::Stopwatch;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct RateSample<C: Clock> {
    count: u64,
    stopwatch: Stopwatch<C>,
}

impl<C: Clock> RateSample<C> {
    fn record(&mut self) {
        self.count += 1;
        // The first item starts the clock and still counts.
        if self.count == 1 {
            self.stopwatch.reset();
            self.stopwatch.start();
        }
    }

    fn rate(&mut self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        self.stopwatch.stop();
        let secs = self.stopwatch.elapsed().as_secs_f64();
        self.stopwatch.start();

        (secs > 0.0).then(|| self.count as f64 / secs)
    }
}

/// A [`BlockingQueue`] that also counts successful sends and reports the
/// average throughput since the first one.
pub struct RateTrackedQueue<T, C: Clock = MonotonicClock> {
    queue: BlockingQueue<T>,
    sample: Mutex<RateSample<C>>,
}

impl<T> Default for RateTrackedQueue<T, MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RateTrackedQueue<T, MonotonicClock> {
    pub fn new() -> Self {
        Self::with_policy(QueuePolicy::Unbounded)
    }

    pub fn with_policy(policy: QueuePolicy) -> Self {
        Self::with_clock(policy, MonotonicClock::default())
    }
}

impl<T, C: Clock> RateTrackedQueue<T, C> {
    pub fn with_clock(policy: QueuePolicy, clock: C) -> Self {
        Self {
            queue: BlockingQueue::with_policy(policy),
            sample: Mutex::new(RateSample {
                count: 0,
                stopwatch: Stopwatch::new(clock),
            }),
        }
    }

    fn sample(&self) -> MutexGuard<'_, RateSample<C>> {
        self.sample.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`; only sends that succeed are counted.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        self.queue.send(item)?;
        self.sample().record();
        Ok(())
    }

    /// Items per second averaged over the time since the first send.
    ///
    /// The timer is paused while the rate is computed and then resumed, so
    /// successive calls keep accumulating. `None` before the first send.
    pub fn rate(&self) -> Option<f64> {
        self.sample().rate()
    }

    /// Total successful sends. `clear()` does not reset it.
    pub fn count(&self) -> u64 {
        self.sample().count
    }

    pub fn elapsed(&self) -> Duration {
        self.sample().stopwatch.elapsed()
    }

    pub fn receive(&self) -> T {
        self.queue.receive()
    }

    pub fn recv(&self) -> Result<T, RecvError> {
        self.queue.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.queue.recv_timeout(timeout)
    }

    pub fn try_receive(&self) -> Option<T> {
        self.queue.try_receive()
    }

    pub fn empty(&self) -> bool {
        self.queue.empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&self) -> usize {
        self.queue.clear()
    }

    pub fn close(&self) {
        self.queue.close()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn policy(&self) -> QueuePolicy {
        self.queue.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::FullPolicy;
    use crate::clock::ManualClock;

    fn tracked(clock: &ManualClock) -> RateTrackedQueue<u32, ManualClock> {
        RateTrackedQueue::with_clock(QueuePolicy::Unbounded, clock.clone())
    }

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = expected * 0.01;
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- 1%, got {actual}"
        );
    }

    #[test]
    fn test_rate_is_none_before_first_send() {
        let clock = ManualClock::new();
        let queue = tracked(&clock);
        clock.advance(Duration::from_secs(1));
        assert_eq!(queue.rate(), None);
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn test_rate_counts_warm_up_item() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(100));
        let queue = tracked(&clock);

        // K = 10 pushes, first at t = 0, last at t = T = 2s.
        let k = 10u32;
        let step = Duration::from_secs(2) / (k - 1);
        for i in 0..k {
            if i > 0 {
                clock.advance(step);
            }
            queue.send(i).unwrap();
        }

        assert_eq!(queue.count(), 10);
        assert_close(queue.rate().unwrap(), 10.0 / 2.0);
    }

    #[test]
    fn test_rate_is_cumulative_across_queries() {
        let clock = ManualClock::new();
        let queue = tracked(&clock);

        for i in 0..20 {
            queue.send(i).unwrap();
            clock.advance(Duration::from_millis(100));
        }
        // K = 20 over T = 2s
        assert_close(queue.rate().unwrap(), 10.0);

        for i in 0..10 {
            queue.send(i).unwrap();
            clock.advance(Duration::from_millis(300));
        }
        // (K + dK) / (T + dt) = 30 / 5s, not the interval rate of 10 / 3s
        assert_close(queue.rate().unwrap(), 6.0);
        assert_eq!(queue.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_elapsed_time_reports_none() {
        let clock = ManualClock::new();
        let queue = tracked(&clock);
        queue.send(1).unwrap();
        assert_eq!(queue.rate(), None);
    }

    #[test]
    fn test_clear_does_not_reset_counter() {
        let clock = ManualClock::new();
        let queue = tracked(&clock);
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        clock.advance(Duration::from_secs(1));

        assert_eq!(queue.clear(), 2);
        assert!(queue.empty());
        assert_eq!(queue.count(), 2);
        assert_close(queue.rate().unwrap(), 2.0);
    }

    #[test]
    fn test_rejected_sends_are_not_counted() {
        let clock = ManualClock::new();
        let queue: RateTrackedQueue<u32, ManualClock> =
            RateTrackedQueue::with_clock(QueuePolicy::bounded(1, FullPolicy::DropNewest), clock);

        queue.send(1).unwrap();
        assert!(queue.send(2).is_err());
        queue.close();
        assert!(queue.send(3).is_err());

        assert_eq!(queue.count(), 1);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.recv(), Ok(1));
        assert_eq!(queue.recv(), Err(RecvError::Closed));
    }
}
