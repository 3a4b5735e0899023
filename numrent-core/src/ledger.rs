//! Ledger store: the relational source of truth for money.
//!
//! The reconciliation engine and the redeem service depend on the
//! [`LedgerStore`] trait rather than on Postgres directly, so each service can
//! be exercised against an in-memory ledger.

use crate::entities::{
    CloseDeposit, Credit, CreditDeposit, CreditRedemption, Deposit, DepositStatus,
    GetPendingDeposits, GetUserEmail, GetUserMetrics,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use numrent_sdk::objects::UserMetricsPayload;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

/// Errors from the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A close was requested with a non-terminal status.
    #[error("cannot close deposit {deposit_id} as {status:?}")]
    InvalidTransition {
        deposit_id: String,
        status: DepositStatus,
    },
}

/// Wallet balances, deposits and transaction history.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch up to `limit` pending deposits with ids greater than `after`.
    async fn pending_deposits(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Deposit>, LedgerError>;

    /// Atomically credit a settled deposit and mark it completed.
    ///
    /// Returns `None` if the deposit was already terminal; nothing is
    /// credited in that case.
    async fn credit_deposit(&self, deposit_id: &str) -> Result<Option<Credit>, LedgerError>;

    /// Move a pending deposit to `status` (failed, expired or cancelled).
    ///
    /// Returns whether this call performed the transition.
    async fn close_deposit(
        &self,
        deposit_id: &str,
        status: DepositStatus,
    ) -> Result<bool, LedgerError>;

    /// Credit a redeemed code to the user's wallet.
    async fn credit_redemption(
        &self,
        user_id: i64,
        amount: Decimal,
        reference: &str,
    ) -> Result<Credit, LedgerError>;

    async fn user_metrics(&self, user_id: i64) -> Result<UserMetricsPayload, LedgerError>;

    async fn user_email(&self, user_id: i64) -> Result<Option<String>, LedgerError>;
}

/// Postgres-backed [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    processor: DatabaseProcessor,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            processor: DatabaseProcessor::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn pending_deposits(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Deposit>, LedgerError> {
        let deposits = self
            .processor
            .process(GetPendingDeposits {
                after: after.map(str::to_owned),
                limit: i64::try_from(limit).unwrap_or(i64::MAX),
            })
            .await?;
        Ok(deposits)
    }

    async fn credit_deposit(&self, deposit_id: &str) -> Result<Option<Credit>, LedgerError> {
        let credit = self
            .processor
            .process(CreditDeposit {
                deposit_id: deposit_id.to_owned(),
            })
            .await?;
        Ok(credit)
    }

    async fn close_deposit(
        &self,
        deposit_id: &str,
        status: DepositStatus,
    ) -> Result<bool, LedgerError> {
        if !status.is_terminal() || status == DepositStatus::Completed {
            return Err(LedgerError::InvalidTransition {
                deposit_id: deposit_id.to_owned(),
                status,
            });
        }
        let closed = self
            .processor
            .process(CloseDeposit {
                deposit_id: deposit_id.to_owned(),
                status,
            })
            .await?;
        Ok(closed)
    }

    async fn credit_redemption(
        &self,
        user_id: i64,
        amount: Decimal,
        reference: &str,
    ) -> Result<Credit, LedgerError> {
        let credit = self
            .processor
            .process(CreditRedemption {
                user_id,
                amount,
                reference: reference.to_owned(),
            })
            .await?;
        Ok(credit)
    }

    async fn user_metrics(&self, user_id: i64) -> Result<UserMetricsPayload, LedgerError> {
        Ok(self.processor.process(GetUserMetrics { user_id }).await?)
    }

    async fn user_email(&self, user_id: i64) -> Result<Option<String>, LedgerError> {
        Ok(self.processor.process(GetUserEmail { user_id }).await?)
    }
}
