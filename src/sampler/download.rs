//! Windowed download timing

use super::{Emitter, RunState, ThroughputTest};
use crate::{error::AppError, models::Direction, stats};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Accumulates streamed bytes and yields a speed once per window
#[derive(Debug)]
pub(crate) struct ThroughputWindow {
    interval: Duration,
    opened: Instant,
    bytes: u64,
    closed: usize,
}

impl ThroughputWindow {
    pub(crate) fn new(opened: Instant, interval: Duration) -> Self {
        Self {
            interval,
            opened,
            bytes: 0,
            closed: 0,
        }
    }

    /// Add a chunk. Returns the window speed in Mbps when the window closes.
    pub(crate) fn push(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        self.bytes += bytes as u64;

        let span = now.saturating_duration_since(self.opened);
        if span < self.interval {
            return None;
        }

        let speed = stats::megabits_per_second(self.bytes, span);
        self.opened = now;
        self.bytes = 0;
        self.closed += 1;
        speed
    }

    /// Number of windows closed so far
    pub(crate) fn closed(&self) -> usize {
        self.closed
    }
}

/// One timed download, bounded by the transfer timeout and the run deadline
pub(super) async fn run_transfer(test: &ThroughputTest, state: &mut RunState, emitter: &Emitter, deadline: Instant) {
    let config = &*test.config;
    let url = test.pick_endpoint().to_string();

    let started = Instant::now();
    let bound = (started + config.transfer_timeout()).min(deadline);
    let mut window = ThroughputWindow::new(started, config.update_interval());
    let mut accepted = 0usize;

    let result = {
        let mut on_chunk = |bytes: usize| {
            let now = Instant::now();
            if let Some(mbps) = window.push(bytes, now) {
                if state.record_speed(mbps, now, config, emitter) {
                    accepted += 1;
                }
            }
        };
        timeout_at(bound, test.transport.download(&url, &mut on_chunk)).await
    };

    let now = Instant::now();
    let elapsed = now.saturating_duration_since(started);

    match result {
        Ok(Ok(bytes)) => {
            // Shorter than one window: time the whole transfer instead
            let mbps = if window.closed() == 0 {
                stats::megabits_per_second(bytes, elapsed)
                    .filter(|&mbps| state.record_speed(mbps, now, config, emitter))
            } else {
                None
            };

            if let Some(logger) = &test.logger {
                logger
                    .log_transfer(Direction::Download, &url, bytes, elapsed.as_secs_f64() * 1000.0, mbps)
                    .await;
            }
        }
        Ok(Err(error)) => {
            state.record_failure(now, config, emitter);
            if let Some(logger) = &test.logger {
                logger
                    .log_transfer_failure(Direction::Download, &url, &error, state.failed_attempts)
                    .await;
            }
        }
        Err(_) => {
            // A transfer cut short after producing samples did its job, and
            // one stopped by the run deadline was not at fault
            if accepted == 0 && bound < deadline {
                state.record_failure(now, config, emitter);
                if let Some(logger) = &test.logger {
                    let error = AppError::timeout(format!(
                        "Download from {} produced no data in {:?}",
                        url,
                        config.transfer_timeout()
                    ));
                    logger
                        .log_transfer_failure(Direction::Download, &url, &error, state.failed_attempts)
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_closes_on_interval() {
        let start = Instant::now();
        let mut window = ThroughputWindow::new(start, Duration::from_millis(200));

        assert_eq!(window.push(100_000, start + Duration::from_millis(100)), None);
        let speed = window.push(150_000, start + Duration::from_millis(200)).unwrap();

        // 250 kB in 200 ms
        assert!((speed - 10.0).abs() < 1e-9);
        assert_eq!(window.closed(), 1);

        // The next window starts empty
        assert_eq!(window.push(1, start + Duration::from_millis(250)), None);
    }
}
