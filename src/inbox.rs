//! Federation inbox: follow requests and posts pushed by remote nodes,
//! and the owner's view of what arrived.

use std::collections::BTreeSet;

use actix_web::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{require_node, require_owner};
use crate::authors::{find_local_author, get_author, sanitize_text, save_author};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{no_content, now, ok, parse_body, refers_to_author, success};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::models::{Author, ContentType, FriendRequest, Post, PostAuthor, RequestSender, Visibility};
use crate::posts::{all_posts, insert_post, prepare_content};
use crate::serializers::{list, posts_json, AuthorJson};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FollowMessage {
    pub sender: AuthorJson,
    pub receiver: AuthorJson,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorRef {
    Id(String),
    Object { id: String },
}

impl AuthorRef {
    fn id(&self) -> &str {
        match self {
            AuthorRef::Id(id) | AuthorRef::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessage {
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    origin: String,
    #[serde(default)]
    description: String,
    #[serde(alias = "content_type")]
    content_type: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(alias = "timestamp")]
    published: Option<DateTime<Utc>>,
    author: AuthorJson,
    visibility: String,
    receiver: AuthorRef,
}

// === Cleared markers ===

pub fn post_marker(post_id: Uuid) -> String {
    format!("post:{post_id}")
}

pub fn request_marker(sender_key: &str) -> String {
    format!("request:{sender_key}")
}

pub fn cleared_markers(tx: &Transaction<'_>, author_id: Uuid) -> anyhow::Result<BTreeSet<String>> {
    Ok(tx.get_list(&inbox_cleared_key(author_id))?.into_iter().collect())
}

// === Store operations ===

pub fn get_request(
    tx: &Transaction<'_>,
    receiver: Uuid,
    sender_key: &str,
) -> anyhow::Result<Option<FriendRequest>> {
    tx.get_json(&friend_request_key(receiver, sender_key))
}

fn last_segment(id: &str) -> &str {
    let id = id.trim().trim_end_matches('/');
    id.rsplit('/').next().unwrap_or(id)
}

/// Whether a `/requests/{segment}` path names `sender_id`: either the full
/// id or its last path segment.
pub fn sender_matches_segment(sender_id: &str, segment: &str) -> bool {
    let sender_id = sender_id.trim();
    !segment.is_empty() && (sender_id == segment || last_segment(sender_id) == segment)
}

/// Resolves a request path segment to the key the request is stored under.
pub fn find_request_key(tx: &Transaction<'_>, receiver: Uuid, segment: &str) -> anyhow::Result<String> {
    if tx.exists(&friend_request_key(receiver, segment)) {
        return Ok(segment.to_string());
    }
    Ok(tx
        .get_list(&friend_requests_key(receiver))?
        .into_iter()
        .find(|key| sender_matches_segment(key, segment))
        .unwrap_or_else(|| segment.to_string()))
}

/// Stores the request unless one from the same sender is already pending.
/// Returns whether it was created.
pub fn upsert_request(tx: &mut Transaction<'_>, request: FriendRequest) -> anyhow::Result<bool> {
    let sender_key = request.sender.key();
    if get_request(tx, request.receiver, &sender_key)?.is_some() {
        return Ok(false);
    }
    tx.set_json(&friend_request_key(request.receiver, &sender_key), &request)?;
    tx.push_list(&friend_requests_key(request.receiver), &sender_key)?;
    Ok(true)
}

pub fn delete_request(tx: &mut Transaction<'_>, receiver: Uuid, sender_key: &str) -> anyhow::Result<bool> {
    let key = friend_request_key(receiver, sender_key);
    if !tx.exists(&key) {
        return Ok(false);
    }
    tx.delete(&key)?;
    tx.remove_from_list(&friend_requests_key(receiver), sender_key)?;
    tx.remove_from_list(&inbox_cleared_key(receiver), &request_marker(sender_key))?;
    Ok(true)
}

/// Pending requests of `receiver` that were not cleared from the inbox.
pub fn pending_requests(tx: &Transaction<'_>, receiver: Uuid) -> anyhow::Result<Vec<FriendRequest>> {
    let cleared = cleared_markers(tx, receiver)?;
    let mut requests = Vec::new();
    for sender_key in tx.get_list(&friend_requests_key(receiver))? {
        if cleared.contains(&request_marker(&sender_key)) {
            continue;
        }
        if let Some(request) = get_request(tx, receiver, &sender_key)? {
            requests.push(request);
        }
    }
    Ok(requests)
}

/// Posts currently in the inbox of `owner`, newest first.
fn inbox_posts(tx: &Transaction<'_>, owner: &Author) -> anyhow::Result<Vec<Post>> {
    let cleared = cleared_markers(tx, owner.id)?;
    Ok(all_posts(tx)?
        .into_iter()
        .filter(|p| !cleared.contains(&post_marker(p.id)))
        .filter(|p| {
            p.to_author == Some(owner.id)
                || (p.visibility == Visibility::Friends
                    && !p.unlisted
                    && p.author.local_id().map_or(false, |a| owner.following.contains(&a)))
        })
        .collect())
}

/// Records a remote follow of `receiver_id`. Shared by the inbox and the
/// requests endpoint.
pub fn receive_follow(tx: &mut Transaction<'_>, receiver_id: Uuid, message: &FollowMessage) -> ApiResult<bool> {
    let sender_id = message.sender.id.trim();
    if sender_id.is_empty() {
        return Err(ApiError::bad_request("sender.id is required"));
    }
    if !refers_to_author(&message.receiver.id, receiver_id) {
        return Err(ApiError::bad_request("receiver does not match inbox owner"));
    }

    let mut receiver = get_author(tx, receiver_id)?;
    let display_name = match sanitize_text(message.sender.display_name.trim()) {
        name if name.is_empty() => sender_id.to_string(),
        name => name,
    };
    let request = FriendRequest {
        receiver: receiver_id,
        sender: RequestSender::Remote {
            id: sender_id.to_string(),
            display_name,
            host: message.sender.host.clone(),
        },
        created_at: now(),
    };
    let created = upsert_request(tx, request)?;

    if receiver.remote_followers.insert(sender_id) {
        save_author(tx, &receiver)?;
    }
    Ok(created)
}

fn receive_post(tx: &mut Transaction<'_>, receiver_id: Uuid, message: PostMessage) -> ApiResult<()> {
    let sender_id = message.author.id.trim().to_string();
    if sender_id.is_empty() {
        return Err(ApiError::bad_request("author.id is required"));
    }
    let visibility: Visibility = message.visibility.parse().map_err(ApiError::BadRequest)?;
    if visibility == Visibility::Public {
        return Err(ApiError::bad_request("Only FRIENDS or PRIVATE posts are delivered"));
    }
    if !refers_to_author(message.receiver.id(), receiver_id) {
        return Err(ApiError::bad_request("receiver does not match inbox owner"));
    }

    let receiver = get_author(tx, receiver_id)?;
    // Local attribution needs a follow edge the receiver created. Remote
    // trust sets are filled by unauthenticated follows.
    let local_sender = find_local_author(tx, &sender_id).filter(|id| receiver.following.contains(id));
    if local_sender.is_none() && !receiver.trusts_remote(&sender_id) {
        warn!(receiver = %receiver_id, sender = %sender_id, "post from untrusted sender rejected");
        return Err(ApiError::bad_request("Sender is not followed by the receiver"));
    }

    let remote_id = message.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    if let Some(remote_id) = remote_id {
        if tx.exists(&inbox_post_key(receiver_id, remote_id)) {
            info!(receiver = %receiver_id, remote_id, "duplicate inbox post ignored");
            return Ok(());
        }
    }

    let title = sanitize_text(message.title.trim());
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::bad_request("Title must be at most 200 characters"));
    }
    let content_type: ContentType = match &message.content_type {
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
        None => ContentType::Plain,
    };

    let author = match local_sender {
        Some(id) => PostAuthor::Local { id },
        None => {
            let name = sanitize_text(message.author.display_name.trim());
            PostAuthor::Remote {
                display_name: if name.is_empty() { sender_id.clone() } else { name },
                id: sender_id.clone(),
            }
        }
    };

    let post = Post {
        id: Uuid::new_v4(),
        title,
        source: sanitize_text(&message.source),
        origin: sanitize_text(&message.origin),
        description: sanitize_text(&message.description),
        content_type,
        content: prepare_content(content_type, &message.content)?,
        author,
        categories: message.categories.iter().map(|c| sanitize_text(c.trim())).collect(),
        published: message.published.unwrap_or_else(now),
        updated_at: None,
        visibility,
        // Delivered copies only surface through the receiver's inbox
        unlisted: true,
        to_author: Some(receiver_id),
        remote_id: remote_id.map(str::to_string),
    };
    insert_post(tx, &post)?;
    if let Some(remote_id) = remote_id {
        tx.set_json(&inbox_post_key(receiver_id, remote_id), &post.id)?;
    }

    info!(receiver = %receiver_id, post = %post.id, sender = %sender_id, "inbox post stored");
    Ok(())
}

// === HTTP Handlers ===

pub fn post_to_inbox(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    require_node(state, req)?;
    let value: Value = parse_body(body)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_default();

    match kind.as_str() {
        "follow" => {
            let message: FollowMessage = serde_json::from_value(value)?;
            state.store.transaction::<_, ApiError>(|tx| {
                if receive_follow(tx, author_id, &message)? {
                    info!(receiver = %author_id, sender = %message.sender.id, "follow request received");
                }
                Ok(())
            })?;
        }
        "post" => {
            let message: PostMessage = serde_json::from_value(value)?;
            state
                .store
                .transaction::<_, ApiError>(|tx| receive_post(tx, author_id, message))?;
        }
        _ => {
            warn!(receiver = %author_id, kind = %kind, "unsupported inbox message");
            return Err(ApiError::bad_request("type must be \"follow\" or \"post\""));
        }
    }

    success()
}

pub fn get_inbox(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    query: &str,
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let owner = get_author(tx, author_id)?;
        let posts = inbox_posts(tx, &owner)?;
        Ok(posts_json(tx, &state.config, &page.apply(posts))?)
    })?;

    ok(&list("inbox", items))
}

/// Marks everything currently in the inbox as cleared.
pub fn clear_inbox(state: &AppState, req: &HttpRequest, author_id: Uuid) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;

    let cleared = state.store.transaction::<_, ApiError>(|tx| {
        let owner = get_author(tx, author_id)?;
        let mut markers: Vec<String> = inbox_posts(tx, &owner)?
            .iter()
            .map(|p| post_marker(p.id))
            .collect();
        markers.extend(
            pending_requests(tx, author_id)?
                .iter()
                .map(|r| request_marker(&r.sender.key())),
        );

        let key = inbox_cleared_key(author_id);
        for marker in &markers {
            tx.push_list(&key, marker)?;
        }
        Ok(markers.len())
    })?;

    info!(author = %author_id, cleared, "inbox cleared");
    no_content()
}
