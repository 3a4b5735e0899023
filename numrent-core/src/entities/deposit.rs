use crate::entities::DepositStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use numrent_sdk::objects::DepositPayload;
use rust_decimal::Decimal;

/// A user-initiated wallet top-up awaiting settlement.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Deposit {
    pub id: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub method: String,
    pub created_at: time::OffsetDateTime,
    pub valid_until: time::OffsetDateTime,
    pub status: DepositStatus,
}

impl Deposit {
    /// Whether the validity deadline has passed at `now`.
    pub fn is_expired_at(&self, now: time::OffsetDateTime) -> bool {
        now > self.valid_until
    }

    /// Notification payload describing this deposit in `status`.
    pub fn to_payload(&self, status: DepositStatus, balance: Option<Decimal>) -> DepositPayload {
        DepositPayload {
            deposit_id: self.id.clone(),
            user_id: self.user_id,
            amount: self.amount,
            method: self.method.clone(),
            status: status.into(),
            valid_until: self.valid_until.unix_timestamp(),
            balance,
        }
    }
}

/// One keyset page of pending deposits, ordered by id.
#[derive(Debug, Clone)]
pub struct GetPendingDeposits {
    /// Return only ids strictly greater than this one.
    pub after: Option<String>,
    pub limit: i64,
}

impl Processor<GetPendingDeposits> for DatabaseProcessor {
    type Output = Vec<Deposit>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingDeposits")]
    async fn process(&self, query: GetPendingDeposits) -> Result<Vec<Deposit>, sqlx::Error> {
        sqlx::query_as::<_, Deposit>(
            r#"
            SELECT id, user_id, amount, method, created_at, valid_until, status
            FROM deposits
            WHERE status = 'pending'
              AND ($1::text IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(query.after)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

/// Move a pending deposit to a terminal state without crediting.
///
/// The update is conditional on the row still being pending, so a terminal
/// deposit is never touched again. Returns whether this call made the change.
#[derive(Debug, Clone)]
pub struct CloseDeposit {
    pub deposit_id: String,
    pub status: DepositStatus,
}

impl Processor<CloseDeposit> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CloseDeposit")]
    async fn process(&self, query: CloseDeposit) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE deposits
            SET status = $2, settled_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(&query.deposit_id)
        .bind(query.status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
