//! Batched upload timing

use super::{Emitter, RunState, ThroughputTest};
use crate::{error::AppError, models::Direction, stats};
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};

/// Send `concurrency` payloads at once and record one speed for the batch.
///
/// The batch speed is the bytes of the successful uploads over the time from
/// batch start to the last success. Every failed upload counts once.
pub(super) async fn run_batch(test: &ThroughputTest, state: &mut RunState, emitter: &Emitter, deadline: Instant) {
    let config = &*test.config;

    let started = Instant::now();
    let bound = (started + config.transfer_timeout()).min(deadline);

    let uploads = (0..config.concurrency).map(|_| {
        let url = test.pick_endpoint().to_string();
        let payload = test.pick_payload();
        let transport = &test.transport;

        async move {
            let result = timeout_at(bound, transport.upload(&url, payload)).await;
            (url, result, Instant::now())
        }
    });

    let mut sent = 0u64;
    let mut last_success: Option<Instant> = None;

    for (url, result, finished) in join_all(uploads).await {
        let elapsed_ms = finished.saturating_duration_since(started).as_secs_f64() * 1000.0;

        let error = match result {
            Ok(Ok(bytes)) => {
                sent += bytes;
                last_success = Some(last_success.map_or(finished, |last| last.max(finished)));
                if let Some(logger) = &test.logger {
                    let mbps = stats::megabits_per_second(bytes, finished.saturating_duration_since(started));
                    logger.log_transfer(Direction::Upload, &url, bytes, elapsed_ms, mbps).await;
                }
                continue;
            }
            Ok(Err(error)) => error,
            // Stopped by the run deadline rather than the transfer timeout
            Err(_) if bound >= deadline => continue,
            Err(_) => AppError::timeout(format!("Upload to {} timed out after {:?}", url, config.transfer_timeout())),
        };

        state.record_failure(finished, config, emitter);
        if let Some(logger) = &test.logger {
            logger
                .log_transfer_failure(Direction::Upload, &url, &error, state.failed_attempts)
                .await;
        }
    }

    if let Some(finished) = last_success {
        if let Some(mbps) = stats::megabits_per_second(sent, finished.saturating_duration_since(started)) {
            state.record_speed(mbps, finished, config, emitter);
        }
    }
}
