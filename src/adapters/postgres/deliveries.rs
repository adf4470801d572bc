use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{DeliveryRow, DeliveryTotalsRow};
use crate::domain::{DeliveryRecord, DeliveryTotals, TimeWindow};
use crate::ports::{DeliveryRepository, InsertOutcome, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresDeliveryRepository {
    pool: PgPool,
}

impl PostgresDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRepository for PostgresDeliveryRepository {
    async fn record_delivery(&self, record: &DeliveryRecord) -> RepositoryResult<InsertOutcome> {
        // One statement: the wallet credit only runs for a row the insert
        // actually produced, so a replayed record never double-credits and a
        // stored record is never left uncredited.
        let delta = record.wallet_delta();
        let row = sqlx::query_as::<_, DeliveryRow>(
            r#"
            WITH inserted AS (
                INSERT INTO delivery_records (
                    id, record_id, farmer_id, farmer_code, trans_time, id_number, trans_code,
                    route_code, route_name, centre_code, centre_name,
                    net_units, payment_rate, gross_pay, transport_cost, transport_recovery, created_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    ROUND($12::NUMERIC, 2), ROUND($13::NUMERIC, 2), ROUND($14::NUMERIC, 2),
                    ROUND($15::NUMERIC, 2), ROUND($16::NUMERIC, 2), $17
                )
                ON CONFLICT (record_id) DO NOTHING
                RETURNING *
            ),
            credited AS (
                INSERT INTO wallets (
                    id, farmer_id, weight, earnings_amount, loan_limit,
                    borrowed_amount, payable_amount, created_at, updated_at
                )
                SELECT
                    $18, inserted.farmer_id, ROUND($19::NUMERIC, 2), ROUND($20::NUMERIC, 2),
                    ROUND($21::NUMERIC, 2), 0, ROUND($22::NUMERIC, 2), NOW(), NOW()
                FROM inserted
                ON CONFLICT (farmer_id) DO UPDATE SET
                    weight = ROUND(wallets.weight + EXCLUDED.weight, 2),
                    earnings_amount = ROUND(wallets.earnings_amount + EXCLUDED.earnings_amount, 2),
                    loan_limit = ROUND(wallets.loan_limit + EXCLUDED.loan_limit, 2),
                    payable_amount = ROUND(wallets.payable_amount + EXCLUDED.payable_amount, 2),
                    updated_at = NOW()
                RETURNING wallets.id
            )
            SELECT inserted.* FROM inserted
            "#,
        )
        .bind(record.id)
        .bind(record.record_id)
        .bind(record.farmer_id)
        .bind(&record.farmer_code)
        .bind(record.trans_time)
        .bind(&record.id_number)
        .bind(&record.trans_code)
        .bind(&record.route_code)
        .bind(&record.route_name)
        .bind(&record.centre_code)
        .bind(&record.centre_name)
        .bind(&record.net_units)
        .bind(&record.payment_rate)
        .bind(&record.gross_pay)
        .bind(&record.transport_cost)
        .bind(&record.transport_recovery)
        .bind(record.created_at)
        .bind(Uuid::new_v4())
        .bind(&delta.weight)
        .bind(&delta.earnings)
        .bind(&delta.loan_limit)
        .bind(&delta.payable)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(match row {
            Some(row) => InsertOutcome::Inserted(row.into_domain()),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn count_in_window(&self, farmer_id: Uuid, window: &TimeWindow) -> RepositoryResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM delivery_records
            WHERE farmer_id = $1 AND trans_time >= $2 AND trans_time <= $3
            "#,
        )
        .bind(farmer_id)
        .bind(window.start_utc())
        .bind(window.end_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(count.max(0) as u64)
    }

    async fn totals_for_farmer(&self, farmer_id: Uuid) -> RepositoryResult<DeliveryTotals> {
        let row = sqlx::query_as::<_, DeliveryTotalsRow>(
            r#"
            SELECT
                COUNT(*) AS records,
                COALESCE(SUM(net_units), 0) AS net_units,
                COALESCE(SUM(gross_pay), 0) AS gross_pay
            FROM delivery_records
            WHERE farmer_id = $1
            "#,
        )
        .bind(farmer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(DeliveryTotals {
            records: row.records.max(0) as u64,
            net_units: row.net_units,
            gross_pay: row.gross_pay,
        })
    }
}
