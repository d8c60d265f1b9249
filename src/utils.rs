use std::future::Future;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::models::retry::RetryConfig;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

/// Runs `operation` until it succeeds or `config.max_attempts` is reached.
///
/// Delays grow by `backoff_multiplier` up to `max_delay_ms`, with +/-10% jitter.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay_ms = config.initial_delay_ms;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if attempt >= max_attempts {
            warn!(
                operation = operation_name,
                attempts = attempt,
                error = %error,
                "Operation failed, retries exhausted"
            );
            return Err(error);
        }

        debug!(
            operation = operation_name,
            attempt,
            max_attempts,
            delay_ms,
            error = %error,
            "Operation failed, backing off"
        );

        sleep(Duration::from_millis(jittered(delay_ms))).await;

        delay_ms = delay_ms
            .saturating_mul(config.backoff_multiplier)
            .min(config.max_delay_ms);
    }
}

fn jittered(delay_ms: u64) -> u64 {
    let jitter: f64 = rand::random_range(-0.1..=0.1);
    (delay_ms as f64 * (1.0 + jitter)) as u64
}
