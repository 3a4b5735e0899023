use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use numrent_sdk::objects::UserMetricsPayload;
use rust_decimal::Decimal;

#[derive(Debug, Clone, sqlx::FromRow)]
struct MetricsRow {
    balance: Decimal,
    total_deposited: Decimal,
    total_spent: Decimal,
    purchases: i64,
}

/// Recompute balance and spend totals for one user.
#[derive(Debug, Clone)]
pub struct GetUserMetrics {
    pub user_id: i64,
}

impl Processor<GetUserMetrics> for DatabaseProcessor {
    type Output = UserMetricsPayload;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserMetrics")]
    async fn process(&self, query: GetUserMetrics) -> Result<UserMetricsPayload, sqlx::Error> {
        // Purchases are stored negative and refunds positive, so the negated
        // sum over both is the net spend.
        let row = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT
                COALESCE((SELECT balance FROM wallets WHERE user_id = $1), 0) AS balance,
                COALESCE(SUM(amount) FILTER (WHERE kind = 'deposit'), 0) AS total_deposited,
                COALESCE(-SUM(amount) FILTER (WHERE kind IN ('purchase', 'refund')), 0) AS total_spent,
                COUNT(*) FILTER (WHERE kind = 'purchase') AS purchases
            FROM transactions
            WHERE user_id = $1
            "#,
        )
        .bind(query.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserMetricsPayload {
            user_id: query.user_id,
            balance: row.balance,
            total_deposited: row.total_deposited,
            total_spent: row.total_spent,
            purchases: row.purchases,
        })
    }
}

/// Look up the e-mail address on file for a user.
#[derive(Debug, Clone)]
pub struct GetUserEmail {
    pub user_id: i64,
}

impl Processor<GetUserEmail> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserEmail")]
    async fn process(&self, query: GetUserEmail) -> Result<Option<String>, sqlx::Error> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
                .bind(query.user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(email.flatten())
    }
}
