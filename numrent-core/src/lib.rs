#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod entities;
pub mod framework;
pub mod gateway;
pub mod kv;
pub mod ledger;
pub mod notify;
pub mod reconcile;
pub mod redeem;

#[cfg(test)]
pub(crate) mod testing;
