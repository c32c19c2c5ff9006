//! On-demand liveness probing of registered agents

use crate::descriptor::DescriptorFetcher;
use agency_common::duration_to_millis_2dp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of the most recent liveness probe of an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_online: bool,
    pub last_checked: Option<DateTime<Utc>>,
    /// Round-trip time in milliseconds, two decimals; absent when the probe timed out
    pub response_time_ms: Option<f64>,
}

/// Probes agents by fetching their descriptor under a hard timeout
#[derive(Clone)]
pub struct HealthProber {
    fetcher: Arc<dyn DescriptorFetcher>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(fetcher: Arc<dyn DescriptorFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Probe a single address. Never fails: problems become `is_online = false`.
    pub async fn probe(&self, address: &str) -> HealthStatus {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.fetcher.fetch(address)).await;
        let elapsed = duration_to_millis_2dp(started.elapsed());

        let (is_online, response_time_ms) = match outcome {
            Ok(Ok(_)) => (true, Some(elapsed)),
            Ok(Err(e)) => {
                debug!("Health probe of {} failed: {}", address, e);
                (false, Some(elapsed))
            }
            Err(_) => {
                warn!(
                    "Health probe of {} timed out after {:?}",
                    address, self.timeout
                );
                (false, None)
            }
        };

        HealthStatus {
            is_online,
            last_checked: Some(Utc::now()),
            response_time_ms,
        }
    }
}
