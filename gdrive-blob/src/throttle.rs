use std::time::Duration;

use tokio::time::Instant;

/// True iff at least `min_interval` has elapsed between `last_emitted_at` and `now`
///
/// Equality emits. A `now` earlier than `last_emitted_at` counts as zero elapsed.
pub fn should_emit(now: Instant, last_emitted_at: Instant, min_interval: Duration) -> bool {
    now.saturating_duration_since(last_emitted_at) >= min_interval
}

/// Progress bookkeeping for a single upload
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    pub last_emitted_at: Option<Instant>,
    pub bytes_processed: u64,
}

/// Rate limiter for progress events of one upload
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    state: ProgressState,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: ProgressState::default(),
        }
    }

    /// Record `chunk_len` processed bytes observed at `now`
    ///
    /// Returns the running total when an event should go out. The first
    /// observation always emits.
    pub fn observe(&mut self, chunk_len: usize, now: Instant) -> Option<u64> {
        self.state.bytes_processed += chunk_len as u64;

        let emit = match self.state.last_emitted_at {
            None => true,
            Some(last) => should_emit(now, last, self.min_interval),
        };

        if emit {
            self.state.last_emitted_at = Some(now);
            Some(self.state.bytes_processed)
        } else {
            None
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.state.bytes_processed
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
