use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::models::{QueueEntryRow, TransactionRow};
use crate::domain::{Resolution, Transaction, TransactionQueueEntry, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, ResolveOutcome, SettlementRepository};

#[derive(Clone)]
pub struct PostgresSettlementRepository {
    pool: PgPool,
}

impl PostgresSettlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn details_json(transaction: &Transaction) -> RepositoryResult<Option<serde_json::Value>> {
    transaction
        .details
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| RepositoryError::Database(e.to_string()))
}

/// Gives back a failed transaction's debit inside the caller's database
/// transaction, so the terminal write and the reversal commit together.
async fn reverse_debit(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    transaction: &TransactionRow,
) -> RepositoryResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE wallets SET
            loan_limit = ROUND(loan_limit + $2::NUMERIC, 2),
            payable_amount = ROUND(payable_amount + $2::NUMERIC, 2),
            borrowed_amount = ROUND(borrowed_amount - $3::NUMERIC, 2),
            updated_at = NOW()
        WHERE farmer_id = $1
        "#,
    )
    .bind(transaction.farmer_id)
    .bind(&transaction.total_amount)
    .bind(&transaction.amount)
    .execute(&mut **tx)
    .await
    .map_err(RepositoryError::from)?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("wallet for farmer {}", transaction.farmer_id)));
    }
    Ok(())
}

#[async_trait]
impl SettlementRepository for PostgresSettlementRepository {
    async fn open(&self, entry: &TransactionQueueEntry, transaction: &Transaction) -> RepositoryResult<()> {
        let details = details_json(transaction)?;
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            r#"
            INSERT INTO transaction_queue (
                id, reference, farmer_id, wallet_id, kind, is_complete, is_notified,
                status, description, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.reference)
        .bind(entry.farmer_id)
        .bind(entry.wallet_id)
        .bind(entry.kind.as_str())
        .bind(entry.is_complete)
        .bind(entry.is_notified)
        .bind(entry.status.as_str())
        .bind(&entry.description)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, farmer_id, wallet_id, queue_entry_id, kind, amount, charge, total_amount,
                status, description, details, gateway_transaction_id, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, ROUND($6::NUMERIC, 2), ROUND($7::NUMERIC, 2), ROUND($8::NUMERIC, 2),
                $9, $10, $11, $12, $13, $14
            )
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.farmer_id)
        .bind(transaction.wallet_id)
        .bind(transaction.queue_entry_id)
        .bind(transaction.kind.as_str())
        .bind(&transaction.amount)
        .bind(&transaction.charge)
        .bind(&transaction.total_amount)
        .bind(transaction.status.as_str())
        .bind(&transaction.description)
        .bind(details)
        .bind(&transaction.gateway_transaction_id)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn attach_reference(&self, entry_id: Uuid, reference: &str, description: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transaction_queue
            SET reference = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .bind(reference)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("queue entry {}", entry_id)));
        }
        Ok(())
    }

    async fn abandon(&self, entry_id: Uuid, description: &str) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let failed = TransactionStatus::Failed.as_str();
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE transaction_queue
            SET status = $2, is_complete = TRUE, description = $3, updated_at = NOW()
            WHERE id = $1 AND NOT is_complete
            RETURNING id
            "#,
        )
        .bind(entry_id)
        .bind(failed)
        .bind(description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if updated.is_none() {
            tx.commit().await.map_err(RepositoryError::from)?;
            return Ok(false);
        }

        let transaction = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $2, description = $3, updated_at = NOW()
            WHERE queue_entry_id = $1
            RETURNING *
            "#,
        )
        .bind(entry_id)
        .bind(failed)
        .bind(description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| RepositoryError::NotFound(format!("transaction for queue entry {}", entry_id)))?;

        reverse_debit(&mut tx, &transaction).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(true)
    }

    async fn resolve(&self, reference: &str, resolution: &Resolution) -> RepositoryResult<ResolveOutcome> {
        let details = resolution
            .details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // The NOT is_complete guard is what makes replayed callbacks no-ops.
        let entry = sqlx::query_as::<_, QueueEntryRow>(
            r#"
            UPDATE transaction_queue
            SET status = $2, is_complete = TRUE, is_notified = TRUE, description = $3, updated_at = NOW()
            WHERE reference = $1 AND NOT is_complete
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(resolution.status.as_str())
        .bind(&resolution.description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        let Some(entry) = entry else {
            let existing = sqlx::query_as::<_, QueueEntryRow>("SELECT * FROM transaction_queue WHERE reference = $1")
                .bind(reference)
                .fetch_optional(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
            tx.commit().await.map_err(RepositoryError::from)?;

            return Ok(match existing {
                Some(row) => ResolveOutcome::AlreadyComplete(row.into_domain()?),
                None => ResolveOutcome::UnknownReference,
            });
        };

        let transaction = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $2,
                description = $3,
                gateway_transaction_id = COALESCE($4, gateway_transaction_id),
                details = COALESCE($5, details),
                updated_at = NOW()
            WHERE queue_entry_id = $1
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(resolution.status.as_str())
        .bind(&resolution.description)
        .bind(&resolution.gateway_transaction_id)
        .bind(details)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| RepositoryError::NotFound(format!("transaction for queue entry {}", entry.id)))?;

        if resolution.status == TransactionStatus::Failed {
            reverse_debit(&mut tx, &transaction).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(ResolveOutcome::Resolved {
            entry: entry.into_domain()?,
            transaction: transaction.into_domain()?,
        })
    }
}
