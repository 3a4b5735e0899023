use crate::entities::TransactionKind;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;

/// Result of a committed wallet credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub user_id: i64,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub transaction_id: i64,
}

/// Credit a settled deposit: mark it completed, increment the wallet and
/// write the transaction record, all in one database transaction.
///
/// Returns `None` when the deposit is no longer pending, in which case
/// nothing is written.
#[derive(Debug, Clone)]
pub struct CreditDeposit {
    pub deposit_id: String,
}

impl Processor<CreditDeposit> for DatabaseProcessor {
    type Output = Option<Credit>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreditDeposit")]
    async fn process(&self, query: CreditDeposit) -> Result<Option<Credit>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i64, Decimal)> = sqlx::query_as(
            r#"
            UPDATE deposits
            SET status = 'completed', settled_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING user_id, amount
            "#,
        )
        .bind(&query.deposit_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, amount)) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let balance_after = increment_wallet(&mut tx, user_id, amount).await?;
        let transaction_id = insert_transaction(
            &mut tx,
            user_id,
            TransactionKind::Deposit,
            amount,
            &query.deposit_id,
            balance_after,
        )
        .await?;

        tx.commit().await?;

        Ok(Some(Credit {
            user_id,
            amount,
            balance_after,
            transaction_id,
        }))
    }
}

/// Credit a redeemed promo code to a wallet.
#[derive(Debug, Clone)]
pub struct CreditRedemption {
    pub user_id: i64,
    pub amount: Decimal,
    /// `CODE:user_id`, unique per redemption.
    pub reference: String,
}

impl Processor<CreditRedemption> for DatabaseProcessor {
    type Output = Credit;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreditRedemption")]
    async fn process(&self, query: CreditRedemption) -> Result<Credit, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let balance_after = increment_wallet(&mut tx, query.user_id, query.amount).await?;
        let transaction_id = insert_transaction(
            &mut tx,
            query.user_id,
            TransactionKind::Redeem,
            query.amount,
            &query.reference,
            balance_after,
        )
        .await?;

        tx.commit().await?;

        Ok(Credit {
            user_id: query.user_id,
            amount: query.amount,
            balance_after,
            transaction_id,
        })
    }
}

/// Atomically add `amount` to the wallet, creating it on first credit.
async fn increment_wallet(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
    amount: Decimal,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO wallets (user_id, balance)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = now()
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
    kind: TransactionKind,
    amount: Decimal,
    reference: &str,
    balance_after: Decimal,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO transactions (user_id, kind, amount, reference, balance_after)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(amount)
    .bind(reference)
    .bind(balance_after)
    .fetch_one(&mut **tx)
    .await
}
