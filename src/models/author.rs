use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifiers of authors living on other nodes.
///
/// Older nodes exchanged these as one space-delimited string;
/// [`RemoteIdSet::from_delimited`] imports that form.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct RemoteIdSet(BTreeSet<String>);

impl RemoteIdSet {
    pub fn from_delimited(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        !id.is_empty() && self.0.insert(id.to_string())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id.trim())
    }

    /// Exact membership. A partial id never matches.
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id.trim())
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub github: String,
    pub host: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub friends: BTreeSet<Uuid>,
    #[serde(default)]
    pub following: BTreeSet<Uuid>,
    #[serde(default)]
    pub followers: BTreeSet<Uuid>,

    #[serde(default)]
    pub remote_followers: RemoteIdSet,
    #[serde(default)]
    pub remote_friends: RemoteIdSet,
    #[serde(default)]
    pub remote_following: RemoteIdSet,
}

impl Author {
    pub fn new(username: &str, password_hash: String, host: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password: password_hash,
            display_name: username.to_string(),
            bio: String::new(),
            location: String::new(),
            birth_date: None,
            github: String::new(),
            host: host.to_string(),
            created_at,
            friends: BTreeSet::new(),
            following: BTreeSet::new(),
            followers: BTreeSet::new(),
            remote_followers: RemoteIdSet::default(),
            remote_friends: RemoteIdSet::default(),
            remote_following: RemoteIdSet::default(),
        }
    }

    /// Whether a remote id may push posts into this author's inbox.
    pub fn trusts_remote(&self, remote_id: &str) -> bool {
        self.remote_followers.contains(remote_id) || self.remote_friends.contains(remote_id)
    }

    pub fn is_friend(&self, other: Uuid) -> bool {
        self.friends.contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_ids_match_exactly() {
        let set = RemoteIdSet::from_delimited("  https://a.example/author/1 https://b.example/author/22 ");
        assert_eq!(set.len(), 2);
        assert!(set.contains("https://a.example/author/1"));
        // A substring of a stored id is not a member.
        assert!(!set.contains("https://b.example/author/2"));
        assert!(!set.contains("author"));
    }

    #[test]
    fn empty_ids_are_never_inserted() {
        let mut set = RemoteIdSet::default();
        assert!(!set.insert("   "));
        assert!(set.insert("x"));
        assert!(!set.insert("x"));
        assert!(set.remove("x"));
        assert!(set.is_empty());
    }
}
