use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::WalletRow;
use crate::domain::{Debit, Wallet};
use crate::ports::{DebitOutcome, RepositoryError, RepositoryResult, WalletRepository};

/// Every mutation is a single statement, so concurrent writers to the same
/// wallet serialize on its row lock and never interleave a check with a write.
#[derive(Clone)]
pub struct PostgresWalletRepository {
    pool: PgPool,
}

impl PostgresWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletRepository for PostgresWalletRepository {
    async fn find_by_farmer(&self, farmer_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE farmer_id = $1")
            .bind(farmer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(WalletRow::into_domain))
    }

    async fn debit_if_covered(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<DebitOutcome> {
        let total = debit.total();
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets SET
                loan_limit = ROUND(loan_limit - $2::NUMERIC, 2),
                payable_amount = ROUND(payable_amount - $2::NUMERIC, 2),
                borrowed_amount = ROUND(borrowed_amount + $3::NUMERIC, 2),
                updated_at = NOW()
            WHERE farmer_id = $1 AND loan_limit >= $2::NUMERIC AND payable_amount >= $2::NUMERIC
            RETURNING *
            "#,
        )
        .bind(farmer_id)
        .bind(&total)
        .bind(&debit.amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if let Some(row) = row {
            return Ok(DebitOutcome::Applied(row.into_domain()));
        }

        Ok(match self.find_by_farmer(farmer_id).await? {
            Some(wallet) => DebitOutcome::Insufficient(wallet),
            None => DebitOutcome::Missing,
        })
    }

    async fn reverse(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets SET
                loan_limit = ROUND(loan_limit + $2::NUMERIC, 2),
                payable_amount = ROUND(payable_amount + $2::NUMERIC, 2),
                borrowed_amount = ROUND(borrowed_amount - $3::NUMERIC, 2),
                updated_at = NOW()
            WHERE farmer_id = $1
            RETURNING *
            "#,
        )
        .bind(farmer_id)
        .bind(debit.total())
        .bind(&debit.amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(WalletRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", farmer_id)))
    }

    async fn reset_all(&self) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE wallets SET
                weight = 0, earnings_amount = 0, loan_limit = 0,
                borrowed_amount = 0, payable_amount = 0, updated_at = NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(result.rows_affected())
    }

    async fn set_totals(
        &self,
        farmer_id: Uuid,
        weight: &BigDecimal,
        earnings: &BigDecimal,
    ) -> RepositoryResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets SET
                weight = ROUND($2::NUMERIC, 2),
                earnings_amount = ROUND($3::NUMERIC, 2),
                updated_at = NOW()
            WHERE farmer_id = $1
            RETURNING *
            "#,
        )
        .bind(farmer_id)
        .bind(weight)
        .bind(earnings)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(WalletRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", farmer_id)))
    }
}
