//! sqlx/Postgres implementations of the repository ports.

mod deliveries;
mod farmers;
mod paybill;
mod settlements;
mod wallets;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::ports::{HealthProbe, RepositoryError, RepositoryResult};

pub use deliveries::PostgresDeliveryRepository;
pub use farmers::PostgresFarmerRepository;
pub use paybill::PostgresPaybillRepository;
pub use settlements::PostgresSettlementRepository;
pub use wallets::PostgresWalletRepository;

/// Answers health checks with a trivial round trip.
#[derive(Clone)]
pub struct PostgresHealthProbe {
    pool: PgPool,
}

impl PostgresHealthProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for PostgresHealthProbe {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}
