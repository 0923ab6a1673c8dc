use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestSender {
    Local { id: Uuid },
    Remote { id: String, display_name: String, host: String },
}

impl RequestSender {
    /// The key the request is stored under, unique per receiver.
    pub fn key(&self) -> String {
        match self {
            RequestSender::Local { id } => id.to_string(),
            RequestSender::Remote { id, .. } => id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FriendRequest {
    pub receiver: Uuid,
    pub sender: RequestSender,
    pub created_at: DateTime<Utc>,
}
