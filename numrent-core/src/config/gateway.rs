//! Settlement gateway credentials.

use std::time::Duration;

/// Settlement gateway endpoint and credentials.
///
/// When this section is absent the engine never calls the gateway and
/// pending deposits simply age out through their deadline.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: url::Url,
    pub api_key: String,
    /// Per-request timeout; a timed-out call counts as still pending.
    pub timeout: Duration,
}
