use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use crate::db::models::PaybillRow;
use crate::domain::PaybillBalance;
use crate::ports::{PaybillRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresPaybillRepository {
    pool: PgPool,
}

impl PostgresPaybillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaybillRepository for PostgresPaybillRepository {
    async fn record_balance(&self, amount: &BigDecimal) -> RepositoryResult<PaybillBalance> {
        let row = sqlx::query_as::<_, PaybillRow>(
            r#"
            INSERT INTO paybill_balance (id, amount, updated_at)
            VALUES (1, ROUND($1::NUMERIC, 2), NOW())
            ON CONFLICT (id) DO UPDATE SET amount = EXCLUDED.amount, updated_at = NOW()
            RETURNING amount, updated_at
            "#,
        )
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.into_domain())
    }

    async fn latest(&self) -> RepositoryResult<Option<PaybillBalance>> {
        let row = sqlx::query_as::<_, PaybillRow>("SELECT amount, updated_at FROM paybill_balance WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(PaybillRow::into_domain))
    }
}
