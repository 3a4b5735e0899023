//! Notification payloads accepted by the dispatcher.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deposit lifecycle state for API payloads.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `numrent-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositState {
    Pending,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl DepositState {
    /// Whether no further transition is allowed from this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, DepositState::Pending)
    }
}

/// A wallet top-up status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPayload {
    pub deposit_id: String,
    pub user_id: i64,
    pub amount: Decimal,
    /// Payment rail tag, e.g. `upi` or `card`.
    pub method: String,
    pub status: DepositState,
    /// Unix timestamp after which the deposit expires.
    pub valid_until: i64,
    /// Wallet balance after the credit, when known.
    #[serde(default)]
    pub balance: Option<Decimal>,
}

/// Rental order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Pending,
    Active,
    Completed,
    Cancelled,
    Refunded,
}

/// A number-rental order status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdatePayload {
    pub order_id: String,
    pub user_id: i64,
    /// Service the number was rented for (e.g. `telegram`, `whatsapp`).
    pub service: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub price: Decimal,
    pub status: OrderState,
    /// Verification code received on the number, if any.
    #[serde(default)]
    pub sms_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

/// An operational alert. Without a user id it goes to the shared admin thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Aggregate wallet figures for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetricsPayload {
    pub user_id: i64,
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_spent: Decimal,
    pub purchases: i64,
}
