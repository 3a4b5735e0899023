//! Redeem code settings.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RedeemConfig {
    /// Number of symbols in a generated code.
    pub code_length: usize,
    /// Lifetime of a code and its usage bookkeeping.
    pub code_ttl: Duration,
    /// Redemptions allowed when the creator does not specify a limit.
    pub default_max_uses: u32,
}

impl Default for RedeemConfig {
    fn default() -> Self {
        Self {
            code_length: 12,
            code_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            default_max_uses: 1,
        }
    }
}
