//! Redeem-code requests, responses and statistics.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the credited amount of a new code is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AmountSpec {
    Fixed { amount: Decimal },
    /// Resolved once, uniformly at cent precision, when the code is created.
    Range { min: Decimal, max: Decimal },
}

/// Who may redeem a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum RedeemScope {
    All,
    User { user_id: i64 },
    List { user_ids: Vec<i64> },
}

impl RedeemScope {
    pub fn allows(&self, user_id: i64) -> bool {
        match self {
            RedeemScope::All => true,
            RedeemScope::User { user_id: allowed } => *allowed == user_id,
            RedeemScope::List { user_ids } => user_ids.contains(&user_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCodeRequest {
    pub amount: AmountSpec,
    pub scope: RedeemScope,
    #[serde(default)]
    pub max_uses: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCodeResponse {
    pub code: CompactString,
    pub amount: Decimal,
    pub max_uses: u32,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub user_id: i64,
    pub code: CompactString,
}

/// Expected, user-facing reasons a redemption is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RedeemRejection {
    #[error("code not found")]
    NotFound,
    #[error("code is no longer active")]
    Inactive,
    #[error("code has expired")]
    Expired,
    #[error("code is not available for this account")]
    NotEligible,
    #[error("already redeemed")]
    AlreadyRedeemed,
    #[error("code has reached its redemption limit")]
    Exhausted,
}

/// Response body of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RedeemRejection>,
}

impl RedeemResponse {
    pub fn redeemed(amount: Decimal, balance: Decimal) -> Self {
        Self {
            success: true,
            amount: Some(amount),
            balance: Some(balance),
            error: None,
        }
    }

    pub fn rejected(reason: RedeemRejection) -> Self {
        Self {
            success: false,
            amount: None,
            balance: None,
            error: Some(reason),
        }
    }
}

/// One audit entry appended on every successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionLogEntry {
    pub user_id: i64,
    pub amount: Decimal,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStats {
    pub code: CompactString,
    pub amount: Decimal,
    pub scope: RedeemScope,
    pub max_uses: u32,
    pub redemptions: u32,
    pub remaining: u32,
    pub active: bool,
    pub created_at: i64,
    pub expires_at: i64,
    pub redeemed_by: Vec<i64>,
    pub log: Vec<RedemptionLogEntry>,
}
