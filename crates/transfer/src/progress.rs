use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Estimates upload throughput from a sliding window of completed chunks.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window`: time window for the estimate (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: VecDeque::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
                window: window.unwrap_or(DEFAULT_WINDOW),
            }),
        }
    }

    /// Records `bytes` finished at the current instant.
    pub fn record(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        s.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        let window = s.window;
        while s
            .samples
            .front()
            .is_some_and(|sample| now.duration_since(sample.timestamp) > window)
        {
            s.samples.pop_front();
        }
        while s.samples.len() > s.max_samples {
            s.samples.pop_front();
        }
    }

    /// Average throughput in bytes/second over the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.front(), s.samples.back()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample marks the start of the window.
        let bytes: u64 = s.samples.iter().skip(1).map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes`, `None` while speed is unknown.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.clear();
    }
}
