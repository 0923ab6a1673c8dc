use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LikeTarget {
    Post { post_id: Uuid },
    Comment { post_id: Uuid, comment_id: Uuid },
}

impl LikeTarget {
    pub fn post_id(&self) -> Uuid {
        match self {
            LikeTarget::Post { post_id } | LikeTarget::Comment { post_id, .. } => *post_id,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Like {
    pub id: Uuid,
    pub author_id: Uuid,
    pub target: LikeTarget,
    pub published: DateTime<Utc>,
}
