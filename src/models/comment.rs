use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ContentType;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub published: DateTime<Utc>,
}
