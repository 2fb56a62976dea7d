use std::sync::atomic::{AtomicBool, Ordering};

/// One-way stop signal shared by the stage threads of a run.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_visible_across_threads() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        thread::scope(|s| {
            s.spawn(|| token.cancel());
        });

        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled(), "cancel is idempotent");
    }
}
