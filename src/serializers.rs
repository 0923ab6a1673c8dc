//! Wire format shared with remote nodes: every object is `{type, id, ...}`
//! and nested authors are expanded in place.

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{comments_key, post_likes_key, Config};
use crate::core::store::Transaction;
use crate::models::{
    Author, Comment, ContentType, FriendRequest, Like, LikeTarget, Post, PostAuthor, RequestSender,
    Visibility,
};

fn author_type() -> String {
    "author".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorJson {
    #[serde(rename = "type", default = "author_type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default)]
    pub github: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub url: String,
    pub title: String,
    pub source: String,
    pub origin: String,
    pub description: String,
    pub content_type: ContentType,
    pub content: String,
    pub author: AuthorJson,
    pub categories: Vec<String>,
    pub count: usize,
    pub likes: usize,
    pub comments: String,
    pub published: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub visibility: Visibility,
    pub unlisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_author: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub url: String,
    pub author: AuthorJson,
    pub comment: String,
    pub content_type: ContentType,
    pub published: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct LikeJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub summary: String,
    pub author: AuthorJson,
    pub object: String,
    pub published: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct FollowJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub summary: String,
    pub sender: AuthorJson,
    pub receiver: AuthorJson,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct ListJson<T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub items: Vec<T>,
}

pub fn list<T: Serialize>(kind: &'static str, items: Vec<T>) -> ListJson<T> {
    ListJson { kind, items }
}

pub fn author_json(config: &Config, author: &Author) -> AuthorJson {
    AuthorJson {
        kind: author_type(),
        id: author.id.to_string(),
        url: config.author_url(author.id),
        host: author.host.clone(),
        display_name: author.display_name.clone(),
        username: author.username.clone(),
        github: author.github.clone(),
        bio: author.bio.clone(),
        location: author.location.clone(),
        birth_date: author.birth_date,
    }
}

pub fn remote_author_json(id: &str, display_name: &str, host: &str) -> AuthorJson {
    AuthorJson {
        kind: author_type(),
        id: id.to_string(),
        url: if id.starts_with("http") { id.to_string() } else { String::new() },
        host: host.to_string(),
        display_name: display_name.to_string(),
        ..AuthorJson::default()
    }
}

pub fn load_author(tx: &Transaction<'_>, id: uuid::Uuid) -> anyhow::Result<Author> {
    tx.get_json(&crate::config::author_key(id))?
        .ok_or_else(|| anyhow!("dangling reference to author {id}"))
}

pub fn post_url(config: &Config, post: &Post) -> String {
    match &post.author {
        PostAuthor::Local { id } => config.post_url(id, post.id),
        PostAuthor::Remote { .. } => match &post.remote_id {
            Some(remote) if remote.starts_with("http") => remote.clone(),
            _ => post.origin.clone(),
        },
    }
}

pub fn post_json(tx: &Transaction<'_>, config: &Config, post: &Post) -> anyhow::Result<PostJson> {
    let author = match &post.author {
        PostAuthor::Local { id } => author_json(config, &load_author(tx, *id)?),
        PostAuthor::Remote { id, display_name } => remote_author_json(id, display_name, ""),
    };
    let url = post_url(config, post);

    Ok(PostJson {
        kind: "post",
        id: post.id.to_string(),
        comments: format!("{url}/comments"),
        url,
        title: post.title.clone(),
        source: post.source.clone(),
        origin: post.origin.clone(),
        description: post.description.clone(),
        content_type: post.content_type,
        content: post.content.clone(),
        author,
        categories: post.categories.clone(),
        count: tx.get_list(&comments_key(post.id))?.len(),
        likes: tx.get_list(&post_likes_key(post.id))?.len(),
        published: post.published,
        updated: post.updated_at,
        visibility: post.visibility,
        unlisted: post.unlisted,
        to_author: post.to_author.map(|id| id.to_string()),
    })
}

pub fn posts_json(tx: &Transaction<'_>, config: &Config, posts: &[Post]) -> anyhow::Result<Vec<PostJson>> {
    posts.iter().map(|p| post_json(tx, config, p)).collect()
}

pub fn comment_json(
    tx: &Transaction<'_>,
    config: &Config,
    post: &Post,
    comment: &Comment,
) -> anyhow::Result<CommentJson> {
    let author = load_author(tx, comment.author_id)?;
    Ok(CommentJson {
        kind: "comment",
        id: comment.id.to_string(),
        url: format!("{}/comments/{}", post_url(config, post), comment.id),
        author: author_json(config, &author),
        comment: comment.content.clone(),
        content_type: comment.content_type,
        published: comment.published,
    })
}

pub fn like_json(tx: &Transaction<'_>, config: &Config, like: &Like) -> anyhow::Result<LikeJson> {
    let author = load_author(tx, like.author_id)?;
    let post: Post = tx
        .get_json(&crate::config::post_key(like.target.post_id()))?
        .ok_or_else(|| anyhow!("like {} points at a missing post", like.id))?;
    let post_url = post_url(config, &post);

    let (object, what) = match like.target {
        LikeTarget::Post { .. } => (post_url, "post"),
        LikeTarget::Comment { comment_id, .. } => (format!("{post_url}/comments/{comment_id}"), "comment"),
    };

    Ok(LikeJson {
        kind: "Like",
        id: like.id.to_string(),
        summary: format!("{} likes your {what}", author.display_name),
        author: author_json(config, &author),
        object,
        published: like.published,
    })
}

pub fn follow_json(
    tx: &Transaction<'_>,
    config: &Config,
    request: &FriendRequest,
) -> anyhow::Result<FollowJson> {
    let receiver = load_author(tx, request.receiver)?;
    let sender = match &request.sender {
        RequestSender::Local { id } => author_json(config, &load_author(tx, *id)?),
        RequestSender::Remote {
            id,
            display_name,
            host,
        } => remote_author_json(id, display_name, host),
    };

    Ok(FollowJson {
        kind: "Follow",
        summary: format!("{} wants to follow {}", sender.display_name, receiver.display_name),
        sender,
        receiver: author_json(config, &receiver),
        created_at: request.created_at,
    })
}
