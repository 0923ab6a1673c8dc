use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenData {
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}
