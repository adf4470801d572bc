use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::FarmerRow;
use crate::domain::Farmer;
use crate::ports::{FarmerRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresFarmerRepository {
    pool: PgPool,
}

impl PostgresFarmerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FarmerRepository for PostgresFarmerRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Farmer>> {
        let row = sqlx::query_as::<_, FarmerRow>("SELECT * FROM farmers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(FarmerRow::into_domain))
    }

    async fn find_by_code(&self, farmer_code: &str) -> RepositoryResult<Option<Farmer>> {
        let row = sqlx::query_as::<_, FarmerRow>("SELECT * FROM farmers WHERE farmer_code = $1")
            .bind(farmer_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(FarmerRow::into_domain))
    }

    async fn list(&self) -> RepositoryResult<Vec<Farmer>> {
        let rows = sqlx::query_as::<_, FarmerRow>("SELECT * FROM farmers ORDER BY farmer_code")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(FarmerRow::into_domain).collect())
    }
}
