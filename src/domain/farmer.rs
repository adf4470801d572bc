use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A produce supplier and borrowing customer. Onboarding happens outside this
/// service; the ledger only reads farmers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farmer {
    pub id: Uuid,
    pub farmer_code: String,
    pub name: String,
    pub phone_number: String,
    pub id_number: String,
    pub can_borrow: bool,
    pub created_at: DateTime<Utc>,
}

impl Farmer {
    pub fn new(farmer_code: String, name: String, phone_number: String, id_number: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            farmer_code,
            name,
            phone_number,
            id_number,
            can_borrow: true,
            created_at: Utc::now(),
        }
    }
}
