use sqlx::PgPool;

/// Executes the query structs in [`crate::entities`] against a pool.
///
/// Each query is a plain struct with a `kanau::processor::Processor`
/// implementation on this type, so call sites read as
/// `processor.process(GetPendingDeposits { .. })`.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
