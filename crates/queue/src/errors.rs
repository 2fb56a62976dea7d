use std::fmt;
use thiserror::Error;

/// Returned by `send` when the item could not be enqueued. The rejected item
/// is handed back to the caller.
#[derive(PartialEq, Eq)]
pub enum SendError<T> {
    /// The queue was closed before or while waiting for capacity.
    Closed(T),
    /// A bounded `DropNewest` queue was full.
    Full(T),
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(item) | SendError::Full(item) => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SendError::Closed(_))
    }
}

// Manual impls so `T` does not need to be `Debug` (frames are large buffers).
impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("Closed(..)"),
            SendError::Full(_) => f.write_str("Full(..)"),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("sending on a closed queue"),
            SendError::Full(_) => f.write_str("queue is full"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    #[error("queue is closed and drained")]
    Closed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    #[error("timed out waiting for an item")]
    Timeout,

    #[error("queue is closed and drained")]
    Closed,
}

impl From<RecvError> for RecvTimeoutError {
    fn from(err: RecvError) -> Self {
        match err {
            RecvError::Closed => RecvTimeoutError::Closed,
        }
    }
}
