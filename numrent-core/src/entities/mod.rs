pub mod deposit;
pub mod transaction;
pub mod wallet;

pub use deposit::{CloseDeposit, Deposit, GetPendingDeposits};
pub use transaction::{Credit, CreditDeposit, CreditRedemption};
pub use wallet::{GetUserEmail, GetUserMetrics};

use numrent_sdk::objects::DepositState;

/// Deposit lifecycle status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `numrent_sdk::objects::DepositState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "deposit_status")]
pub enum DepositStatus {
    Pending,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl DepositStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DepositStatus::Pending)
    }
}

impl From<DepositStatus> for DepositState {
    fn from(value: DepositStatus) -> Self {
        match value {
            DepositStatus::Pending => DepositState::Pending,
            DepositStatus::Completed => DepositState::Completed,
            DepositStatus::Failed => DepositState::Failed,
            DepositStatus::Expired => DepositState::Expired,
            DepositStatus::Cancelled => DepositState::Cancelled,
        }
    }
}

/// Kind of an immutable wallet transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "transaction_kind")]
pub enum TransactionKind {
    Deposit,
    Redeem,
    Purchase,
    Refund,
}
