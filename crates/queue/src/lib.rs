//! Synchronized queues that move values between pipeline stages.
//!
//! [`BlockingQueue`] is a single-producer/single-consumer FIFO with a
//! blocking receive and an optional bounded policy. [`RateTrackedQueue`]
//! adds a send counter and a pausable timer for throughput reporting.

pub mod blocking;
pub mod clock;
pub mod errors;
pub mod rate;
pub mod stopwatch;

pub use blocking::{BlockingQueue, FullPolicy, QueuePolicy};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{RecvError, RecvTimeoutError, SendError};
pub use rate::RateTrackedQueue;
pub use stopwatch::Stopwatch;
