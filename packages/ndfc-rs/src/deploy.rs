//! Configuration deploy with bounded retry.
//!
//! The config-deploy endpoint is non-reentrant: while one deploy runs, the
//! server answers further requests with a 500 whose body says the deploy is
//! already in progress. That is the only retryable error class. The retry
//! schedule doubles from 2s and caps at 30s, each delay perturbed by ±20%
//! so replicas that collided once do not collide on every retry. Callers
//! impose the overall deadline with `tokio::time::timeout`, which cancels a
//! retry mid-sleep.

use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use tracing::{info, warn};

use crate::error::NdfcError;
use crate::paths::{api_path, LAN_FABRIC_V1};
use crate::NdfcClient;

pub const DEPLOY_MAX_ATTEMPTS: u32 = 6;
const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(30);
const JITTER_FRACTION: f64 = 0.2;

/// Undithered delay before attempt `attempt + 1` (attempts count from 1):
/// 2, 4, 8, 16, 30, 30 seconds.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(30);
    let delay = BASE_DELAY.saturating_mul(1u32 << exp);
    delay.min(MAX_DELAY)
}

fn jittered(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    delay.mul_f64(factor)
}

impl NdfcClient {
    /// Trigger a config-deploy for the whole fabric, retrying while the
    /// server reports a deploy already in progress.
    pub async fn deploy_config(&self, fabric: &str) -> Result<(), NdfcError> {
        let path = api_path(
            LAN_FABRIC_V1,
            &["rest", "control", "fabrics", fabric, "config-deploy"],
        )?;
        let query = [
            ("forceShowRun", "false".to_string()),
            ("inclAllMSDSwitches", "true".to_string()),
        ];

        let mut attempt = 1;
        loop {
            match self.send(Method::POST, &path, &query, None).await {
                Ok(_) => {
                    info!(fabric = %fabric, attempt, "config-deploy accepted");
                    return Ok(());
                }
                Err(err) if err.is_deploy_in_progress() && attempt < DEPLOY_MAX_ATTEMPTS => {
                    let delay = jittered(retry_delay(attempt));
                    warn!(
                        fabric = %fabric,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "deploy already in progress, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_is_doubling_capped_at_thirty() {
        let secs: Vec<u64> = (1..=6).map(|a| retry_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn jitter_stays_within_band() {
        for attempt in 1..=6 {
            let base = retry_delay(attempt);
            for _ in 0..200 {
                let delay = jittered(base);
                assert!(delay >= base.mul_f64(1.0 - JITTER_FRACTION));
                assert!(delay <= base.mul_f64(1.0 + JITTER_FRACTION + f64::EPSILON));
            }
        }
    }
}
