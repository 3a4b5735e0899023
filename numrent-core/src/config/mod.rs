//! Configuration types for numrent.
//!
//! These types represent the validated runtime configuration used by the
//! services in this crate. Loading and parsing the TOML file is handled by
//! the server crate.

mod email;
mod gateway;
mod reconcile;
mod redeem;
mod telegram;

pub use email::EmailConfig;
pub use gateway::GatewayConfig;
pub use reconcile::ReconcileConfig;
pub use redeem::RedeemConfig;
pub use telegram::TelegramConfig;
