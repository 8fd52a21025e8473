//! Rate limiting for the manual buzzer endpoint
//!
//! GCRA limits keyed on the peer IP through tower_governor. The service must
//! be served with `into_make_service_with_connect_info::<SocketAddr>()`.

use crate::ApiError;
use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config with X-RateLimit-* headers enabled
pub type BuzzerGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Requests allowed back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 2,
            burst_size: 3,
        }
    }
}

impl RateLimitConfig {
    /// Tight limit used by tests
    pub fn strict() -> Self {
        Self {
            per_second: 60,
            burst_size: 1,
        }
    }
}

pub fn create_governor_config(config: &RateLimitConfig) -> Result<Arc<BuzzerGovernorConfig>, ApiError> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
        .ok_or_else(|| ApiError::Config("rate limit period and burst must be non-zero".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second, 2);
        assert_eq!(config.burst_size, 3);
        assert!(create_governor_config(&config).is_ok());
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = RateLimitConfig {
            per_second: 1,
            burst_size: 0,
        };
        assert!(matches!(create_governor_config(&config), Err(ApiError::Config(_))));
    }
}
