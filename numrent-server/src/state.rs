//! Services reachable from request handlers.

use numrent_core::notify::Notifier;
use numrent_core::redeem::RedeemService;
use std::sync::Arc;

/// Handler state. Cloned per request; the dispatcher already shares its
/// channels and the redeem service is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out to the configured notification channels.
    pub notifier: Notifier,
    pub redeem: Arc<RedeemService>,
}

impl AppState {
    pub fn new(notifier: Notifier, redeem: RedeemService) -> Self {
        Self {
            notifier,
            redeem: Arc::new(redeem),
        }
    }
}
