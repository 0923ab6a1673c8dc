use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    #[serde(rename = "text/plain")]
    Plain,
    #[serde(rename = "text/markdown")]
    Markdown,
    #[serde(rename = "application/base64")]
    Base64,
    #[serde(rename = "image/png;base64")]
    Png,
    #[serde(rename = "image/jpeg;base64")]
    Jpeg,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain",
            ContentType::Markdown => "text/markdown",
            ContentType::Base64 => "application/base64",
            ContentType::Png => "image/png;base64",
            ContentType::Jpeg => "image/jpeg;base64",
        }
    }

    /// Binary payloads carried as base64 text.
    pub fn is_binary(&self) -> bool {
        matches!(self, ContentType::Base64 | ContentType::Png | ContentType::Jpeg)
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text/plain" => Ok(ContentType::Plain),
            "text/markdown" => Ok(ContentType::Markdown),
            "application/base64" => Ok(ContentType::Base64),
            "image/png;base64" | "image/png" => Ok(ContentType::Png),
            "image/jpeg;base64" | "image/jpeg" => Ok(ContentType::Jpeg),
            other => Err(format!("Unsupported content type: {other}")),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    #[default]
    Public,
    Friends,
    Private,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Visibility::Public),
            "FRIENDS" => Ok(Visibility::Friends),
            "PRIVATE" => Ok(Visibility::Private),
            other => Err(format!("Unknown visibility: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PostAuthor {
    Local { id: Uuid },
    Remote { id: String, display_name: String },
}

impl PostAuthor {
    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            PostAuthor::Local { id } => Some(*id),
            PostAuthor::Remote { .. } => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub description: String,
    pub content_type: ContentType,
    pub content: String,
    pub author: PostAuthor,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub visibility: Visibility,
    #[serde(default)]
    pub unlisted: bool,
    pub to_author: Option<Uuid>,
    /// Id the sending node used, for posts received through an inbox.
    pub remote_id: Option<String>,
}

impl Post {
    pub fn is_owned_by(&self, author_id: Uuid) -> bool {
        self.author.local_id() == Some(author_id)
    }

    /// Listed in public timelines.
    pub fn is_public_listed(&self) -> bool {
        self.visibility == Visibility::Public && !self.unlisted
    }
}
