//! Redeem codes: a second way money enters a wallet.
//!
//! Code metadata and usage bookkeeping live in the key-value store:
//!
//! - `redeem:code:{CODE}` hash with amount, scope, limits and flags
//! - `redeem:used:{CODE}` set of user ids that redeemed the code
//! - `redeem:log:{CODE}` list of JSON audit entries
//!
//! A redemption first claims a use atomically in the store and only then
//! credits the wallet. A crash in between leaves the code spent and the wallet
//! uncredited, which the audit log makes visible; the reverse order could
//! credit twice.

mod code;

pub use code::{CODE_ALPHABET, CodeRecord, generate_code, normalize_code, resolve_amount};

use code::{FIELD_ACTIVE, FIELD_REDEMPTIONS};

use crate::config::RedeemConfig;
use crate::kv::{ClaimOutcome, GuardedClaim, KeyValueStore, KvError};
use crate::ledger::{LedgerError, LedgerStore};
use crate::notify::{Notifier, RedeemNotice};
use numrent_sdk::objects::{
    AmountSpec, CodeStats, CreateCodeResponse, RedeemRejection, RedeemResponse, RedeemScope,
    RedemptionLogEntry,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Attempts at finding an unused code before giving up.
const MAX_GENERATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt metadata for code {code}: {reason}")]
    Corrupt { code: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no unused code found after {MAX_GENERATION_ATTEMPTS} attempts")]
    CodeSpaceExhausted,
}

/// Result of a redemption attempt that did not hit an infrastructure error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed { amount: Decimal, balance: Decimal },
    Rejected(RedeemRejection),
}

impl From<RedeemOutcome> for RedeemResponse {
    fn from(outcome: RedeemOutcome) -> Self {
        match outcome {
            RedeemOutcome::Redeemed { amount, balance } => RedeemResponse::redeemed(amount, balance),
            RedeemOutcome::Rejected(reason) => RedeemResponse::rejected(reason),
        }
    }
}

fn code_key(code: &str) -> String {
    format!("redeem:code:{code}")
}

fn used_key(code: &str) -> String {
    format!("redeem:used:{code}")
}

fn log_key(code: &str) -> String {
    format!("redeem:log:{code}")
}

pub struct RedeemService {
    kv: Arc<dyn KeyValueStore>,
    ledger: Arc<dyn LedgerStore>,
    notifier: Notifier,
    config: RedeemConfig,
}

impl RedeemService {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        ledger: Arc<dyn LedgerStore>,
        notifier: Notifier,
        config: RedeemConfig,
    ) -> Self {
        Self {
            kv,
            ledger,
            notifier,
            config,
        }
    }

    /// Create a new code. The amount is fixed at creation time.
    pub async fn create_code(
        &self,
        amount: AmountSpec,
        scope: RedeemScope,
        max_uses: Option<u32>,
    ) -> Result<CreateCodeResponse, RedeemError> {
        let max_uses = max_uses.unwrap_or(self.config.default_max_uses);
        if max_uses == 0 {
            return Err(RedeemError::InvalidRequest(
                "max_uses must be at least 1".to_owned(),
            ));
        }
        let amount = resolve_amount(&amount)?;

        let mut code = None;
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = generate_code(self.config.code_length);
            if !self.kv.exists(&code_key(&candidate)).await? {
                code = Some(candidate);
                break;
            }
            warn!(code = %candidate, "Generated code already exists, retrying");
        }
        let code = code.ok_or(RedeemError::CodeSpaceExhausted)?;

        let created_at = time::OffsetDateTime::now_utc().unix_timestamp();
        let ttl_secs = i64::try_from(self.config.code_ttl.as_secs()).unwrap_or(i64::MAX);
        let record = CodeRecord {
            amount,
            scope,
            max_uses,
            redemptions: 0,
            active: true,
            created_at,
            expires_at: created_at.saturating_add(ttl_secs),
        };
        self.kv
            .hash_set(&code_key(&code), &record.to_fields()?, Some(self.config.code_ttl))
            .await?;

        info!(code = %code, amount = %amount, max_uses, "Redeem code created");
        Ok(CreateCodeResponse {
            code,
            amount,
            max_uses,
            expires_at: record.expires_at,
        })
    }

    /// Redeem `code` for `user_id`.
    ///
    /// Expected refusals come back as [`RedeemOutcome::Rejected`]; errors are
    /// reserved for store failures.
    pub async fn redeem(&self, user_id: i64, code: &str) -> Result<RedeemOutcome, RedeemError> {
        let code = normalize_code(code);
        let fields = self.kv.hash_get_all(&code_key(&code)).await?;
        let Some(record) = CodeRecord::from_fields(&code, &fields)? else {
            return Ok(RedeemOutcome::Rejected(RedeemRejection::NotFound));
        };

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let member = user_id.to_string();
        let rejection = if !record.active {
            Some(RedeemRejection::Inactive)
        } else if now > record.expires_at {
            Some(RedeemRejection::Expired)
        } else if !record.scope.allows(user_id) {
            Some(RedeemRejection::NotEligible)
        } else if self.kv.set_contains(&used_key(&code), &member).await? {
            Some(RedeemRejection::AlreadyRedeemed)
        } else if record.redemptions >= record.max_uses {
            Some(RedeemRejection::Exhausted)
        } else {
            None
        };
        if let Some(reason) = rejection {
            info!(code = %code, user_id, reason = %reason, "Redemption refused");
            return Ok(RedeemOutcome::Rejected(reason));
        }

        // Existence, the active flag, membership and the cap are checked
        // again inside the claim: a revoke, an expiry or a concurrent attempt
        // may have landed since the read above.
        let log_entry = serde_json::to_string(&RedemptionLogEntry {
            user_id,
            amount: record.amount,
            at: now,
        })?;
        let (counter_key, set_key, list_key) = (code_key(&code), used_key(&code), log_key(&code));
        let claim = GuardedClaim {
            counter_key: &counter_key,
            counter_field: FIELD_REDEMPTIONS,
            active_field: FIELD_ACTIVE,
            limit: record.max_uses,
            set_key: &set_key,
            member: &member,
            log_key: &list_key,
            log_entry: &log_entry,
        };
        let lost_race = match self.kv.guarded_claim(&claim).await? {
            ClaimOutcome::Claimed(_) => None,
            ClaimOutcome::Missing => Some(RedeemRejection::NotFound),
            ClaimOutcome::Inactive => Some(RedeemRejection::Inactive),
            ClaimOutcome::AlreadyMember => Some(RedeemRejection::AlreadyRedeemed),
            ClaimOutcome::LimitReached => Some(RedeemRejection::Exhausted),
        };
        if let Some(reason) = lost_race {
            info!(code = %code, user_id, reason = %reason, "Redemption refused at claim");
            return Ok(RedeemOutcome::Rejected(reason));
        }

        let reference = format!("{code}:{user_id}");
        let credit = match self
            .ledger
            .credit_redemption(user_id, record.amount, &reference)
            .await
        {
            Ok(credit) => credit,
            Err(e) => {
                error!(
                    code = %code,
                    user_id,
                    amount = %record.amount,
                    error = %e,
                    "Code claimed but wallet credit failed"
                );
                return Err(e.into());
            }
        };

        info!(
            code = %code,
            user_id,
            amount = %credit.amount,
            balance = %credit.balance_after,
            "Code redeemed"
        );
        self.notifier
            .redeem(RedeemNotice {
                user_id,
                code,
                amount: credit.amount,
                balance: credit.balance_after,
            })
            .await;

        Ok(RedeemOutcome::Redeemed {
            amount: credit.amount,
            balance: credit.balance_after,
        })
    }

    /// Deactivate a code. Returns whether the code existed.
    pub async fn revoke_code(&self, code: &str) -> Result<bool, RedeemError> {
        let code = normalize_code(code);
        let existed = self
            .kv
            .hash_update(&code_key(&code), &[(FIELD_ACTIVE, "0".to_owned())])
            .await?;
        if existed {
            info!(code = %code, "Redeem code revoked");
        }
        Ok(existed)
    }

    pub async fn get_code_stats(&self, code: &str) -> Result<Option<CodeStats>, RedeemError> {
        let code = normalize_code(code);
        let fields = self.kv.hash_get_all(&code_key(&code)).await?;
        let Some(record) = CodeRecord::from_fields(&code, &fields)? else {
            return Ok(None);
        };

        let corrupt = |reason: String| RedeemError::Corrupt {
            code: code.to_string(),
            reason,
        };
        let mut redeemed_by = self
            .kv
            .set_members(&used_key(&code))
            .await?
            .iter()
            .map(|m| m.parse::<i64>().map_err(|e| corrupt(format!("used-by member: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        redeemed_by.sort_unstable();
        let log = self
            .kv
            .list_range(&log_key(&code))
            .await?
            .iter()
            .map(|entry| {
                serde_json::from_str::<RedemptionLogEntry>(entry)
                    .map_err(|e| corrupt(format!("log entry: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CodeStats {
            code: code.clone(),
            amount: record.amount,
            scope: record.scope,
            max_uses: record.max_uses,
            redemptions: record.redemptions,
            remaining: record.max_uses.saturating_sub(record.redemptions),
            active: record.active,
            created_at: record.created_at,
            expires_at: record.expires_at,
            redeemed_by,
            log,
        }))
    }
}
