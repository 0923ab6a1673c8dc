use actix_web::{HttpRequest, HttpResponse};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_author, require_node, require_owner, validate_token};
use crate::authors::{get_author, save_author};
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{no_content, now, ok, parse_body, success};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::inbox::{
    delete_request, find_request_key, get_request, pending_requests, receive_follow, sender_matches_segment,
    upsert_request, FollowMessage,
};
use crate::models::{Author, FriendRequest, RemoteIdSet, RequestSender};
use crate::serializers::{author_json, follow_json, list, remote_author_json, AuthorJson};
use crate::state::AppState;

// === Store operations ===

pub fn follow_author(tx: &mut Transaction<'_>, follower_id: Uuid, followee_id: Uuid) -> ApiResult<()> {
    if follower_id == followee_id {
        return Err(ApiError::bad_request("Authors cannot follow themselves"));
    }
    let mut follower = get_author(tx, follower_id)?;
    let mut followee = get_author(tx, followee_id)?;

    if follower.following.insert(followee_id) {
        save_author(tx, &follower)?;
    }
    if followee.followers.insert(follower_id) {
        save_author(tx, &followee)?;
    }
    Ok(())
}

/// Removes the follow edge. A friendship cannot outlive either follow
/// edge, so it goes too.
pub fn unfollow_author(tx: &mut Transaction<'_>, follower_id: Uuid, followee_id: Uuid) -> ApiResult<()> {
    let mut follower = get_author(tx, follower_id)?;
    let mut followee = get_author(tx, followee_id)?;

    follower.following.remove(&followee_id);
    follower.friends.remove(&followee_id);
    followee.followers.remove(&follower_id);
    followee.friends.remove(&follower_id);

    save_author(tx, &follower)?;
    save_author(tx, &followee)?;
    Ok(())
}

/// Makes two local authors friends, adding both follow edges.
pub fn befriend(tx: &mut Transaction<'_>, a: Uuid, b: Uuid) -> ApiResult<()> {
    follow_author(tx, a, b)?;
    follow_author(tx, b, a)?;

    for (id, other) in [(a, b), (b, a)] {
        let mut author = get_author(tx, id)?;
        if author.friends.insert(other) {
            save_author(tx, &author)?;
        }
    }
    Ok(())
}

pub fn unfriend(tx: &mut Transaction<'_>, a: Uuid, b: Uuid) -> ApiResult<()> {
    for (id, other) in [(a, b), (b, a)] {
        let mut author = get_author(tx, id)?;
        if author.friends.remove(&other) {
            save_author(tx, &author)?;
        }
    }
    Ok(())
}

fn load_authors<'a>(
    tx: &Transaction<'_>,
    ids: impl IntoIterator<Item = &'a Uuid>,
) -> anyhow::Result<Vec<Author>> {
    let mut authors = Vec::new();
    for id in ids {
        if let Some(a) = tx.get_json::<Author>(&crate::config::author_key(id))? {
            authors.push(a);
        }
    }
    Ok(authors)
}

fn relation_json(
    state: &AppState,
    tx: &Transaction<'_>,
    local: &std::collections::BTreeSet<Uuid>,
    remote: &RemoteIdSet,
) -> anyhow::Result<Vec<AuthorJson>> {
    let mut items: Vec<AuthorJson> = load_authors(tx, local)?
        .iter()
        .map(|a| author_json(&state.config, a))
        .collect();
    items.extend(remote.iter().map(|id| remote_author_json(id, id, "")));
    Ok(items)
}

/// Path segments naming another author: a local uuid or an encoded remote id.
enum Peer {
    Local(Uuid),
    Remote(String),
}

impl Peer {
    fn parse(segment: &str) -> Self {
        match Uuid::parse_str(segment) {
            Ok(id) => Peer::Local(id),
            Err(_) => Peer::Remote(
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| segment.to_string()),
            ),
        }
    }

    fn key(&self) -> String {
        match self {
            Peer::Local(id) => id.to_string(),
            Peer::Remote(id) => id.clone(),
        }
    }
}

// === HTTP Handlers ===

#[derive(Clone, Copy)]
pub enum Relation {
    Followers,
    Following,
    Friends,
}

impl Relation {
    fn name(self) -> &'static str {
        match self {
            Relation::Followers => "followers",
            Relation::Following => "following",
            Relation::Friends => "friends",
        }
    }
}

pub fn list_relation(
    state: &AppState,
    author_id: Uuid,
    relation: Relation,
    query: &str,
) -> ApiResult<HttpResponse> {
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let author = get_author(tx, author_id)?;
        let items = match relation {
            Relation::Followers => relation_json(state, tx, &author.followers, &author.remote_followers)?,
            Relation::Following => relation_json(state, tx, &author.following, &author.remote_following)?,
            Relation::Friends => relation_json(state, tx, &author.friends, &author.remote_friends)?,
        };
        Ok(page.apply(items))
    })?;

    ok(&list(relation.name(), items))
}

/// Returns the peer if it is in the given relation of `author_id`, else 404.
pub fn get_relation(
    state: &AppState,
    author_id: Uuid,
    relation: Relation,
    peer: &str,
) -> ApiResult<HttpResponse> {
    let peer = Peer::parse(peer);

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let author = get_author(tx, author_id)?;
        let (local, remote) = match relation {
            Relation::Followers => (&author.followers, &author.remote_followers),
            Relation::Following => (&author.following, &author.remote_following),
            Relation::Friends => (&author.friends, &author.remote_friends),
        };
        let missing = || ApiError::NotFound(format!("Not in {}", relation.name()));

        match &peer {
            Peer::Local(id) if local.contains(id) => Ok(author_json(&state.config, &get_author(tx, *id)?)),
            Peer::Remote(id) if remote.contains(id) => Ok(remote_author_json(id, id, "")),
            _ => Err(missing()),
        }
    })?;

    ok(&body)
}

/// `fid` starts following `author_id` and asks to be their friend.
pub fn put_follower(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    follower: &str,
) -> ApiResult<HttpResponse> {
    let Peer::Local(follower_id) = Peer::parse(follower) else {
        return Err(ApiError::bad_request("Remote authors follow through the inbox"));
    };
    require_owner(state, req, follower_id)?;

    state.store.transaction::<_, ApiError>(|tx| {
        follow_author(tx, follower_id, author_id)?;
        upsert_request(
            tx,
            FriendRequest {
                receiver: author_id,
                sender: RequestSender::Local { id: follower_id },
                created_at: now(),
            },
        )?;
        Ok(())
    })?;

    info!(follower = %follower_id, followee = %author_id, "follow added");
    success()
}

pub fn delete_follower(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    follower: &str,
) -> ApiResult<HttpResponse> {
    let user_id = require_author(state, req)?;
    let peer = Peer::parse(follower);

    state.store.transaction::<_, ApiError>(|tx| {
        match &peer {
            Peer::Local(follower_id) => {
                if user_id != *follower_id && user_id != author_id {
                    return Err(ApiError::Forbidden);
                }
                unfollow_author(tx, *follower_id, author_id)?;
                delete_request(tx, author_id, &peer.key())?;
            }
            Peer::Remote(remote_id) => {
                if user_id != author_id {
                    return Err(ApiError::Forbidden);
                }
                let mut author = get_author(tx, author_id)?;
                author.remote_followers.remove(remote_id);
                author.remote_friends.remove(remote_id);
                save_author(tx, &author)?;
                delete_request(tx, author_id, remote_id)?;
            }
        }
        Ok(())
    })?;

    info!(author = %author_id, follower = %peer.key(), "follower removed");
    no_content()
}

pub fn put_friend(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    friend: &str,
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let peer = Peer::parse(friend);

    state.store.transaction::<_, ApiError>(|tx| {
        let mut author = get_author(tx, author_id)?;
        match &peer {
            Peer::Local(friend_id) => {
                if !author.following.contains(friend_id) {
                    return Err(ApiError::not_found("Not following this author"));
                }
                befriend(tx, author_id, *friend_id)?;
            }
            Peer::Remote(remote_id) => {
                if !author.remote_following.contains(remote_id) {
                    return Err(ApiError::not_found("Not following this author"));
                }
                author.remote_friends.insert(remote_id);
                save_author(tx, &author)?;
            }
        }
        Ok(())
    })?;

    info!(author = %author_id, friend = %peer.key(), "friend added");
    success()
}

pub fn delete_friend(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    friend: &str,
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let peer = Peer::parse(friend);

    state.store.transaction::<_, ApiError>(|tx| {
        match &peer {
            Peer::Local(friend_id) => unfriend(tx, author_id, *friend_id)?,
            Peer::Remote(remote_id) => {
                let mut author = get_author(tx, author_id)?;
                if author.remote_friends.remove(remote_id) {
                    save_author(tx, &author)?;
                }
            }
        }
        Ok(())
    })?;

    info!(author = %author_id, friend = %peer.key(), "friend removed");
    no_content()
}

pub fn list_requests(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    query: &str,
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        get_author(tx, author_id)?;
        page.apply(pending_requests(tx, author_id)?)
            .iter()
            .map(|r| follow_json(tx, &state.config, r).map_err(ApiError::from))
            .collect::<ApiResult<Vec<_>>>()
    })?;

    ok(&list("requests", items))
}

/// The request is visible to its receiver and to a local sender.
pub fn get_friend_request(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    sender: &str,
) -> ApiResult<HttpResponse> {
    let viewer = validate_token(state, req).ok_or(ApiError::Unauthorized)?;
    let peer = Peer::parse(sender);
    if viewer != author_id && !matches!(peer, Peer::Local(id) if id == viewer) {
        return Err(ApiError::Unauthorized);
    }

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let key = find_request_key(tx, author_id, &peer.key())?;
        let request = get_request(tx, author_id, &key)?
            .ok_or_else(|| ApiError::not_found("Friend request not found"))?;
        Ok(follow_json(tx, &state.config, &request)?)
    })?;

    ok(&body)
}

/// Remote follow delivered to the requests collection; same payload and
/// semantics as a `follow` inbox message.
pub fn put_friend_request(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    sender: &str,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    require_node(state, req)?;
    let value: Value = parse_body(body)?;
    let message: FollowMessage = serde_json::from_value(value)?;

    if !sender_matches_segment(&message.sender.id, &Peer::parse(sender).key()) {
        return Err(ApiError::bad_request("sender does not match request path"));
    }

    state.store.transaction::<_, ApiError>(|tx| {
        if receive_follow(tx, author_id, &message)? {
            info!(receiver = %author_id, sender = %message.sender.id, "follow request received");
        }
        Ok(())
    })?;

    success()
}

/// The sender withdraws or the receiver declines.
pub fn delete_friend_request(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    sender: &str,
) -> ApiResult<HttpResponse> {
    let user_id = require_author(state, req)?;
    let peer = Peer::parse(sender);
    if user_id != author_id && !matches!(peer, Peer::Local(id) if id == user_id) {
        return Err(ApiError::Forbidden);
    }

    state.store.transaction::<_, ApiError>(|tx| {
        let key = find_request_key(tx, author_id, &peer.key())?;
        if !delete_request(tx, author_id, &key)? {
            return Err(ApiError::not_found("Friend request not found"));
        }
        Ok(())
    })?;

    info!(receiver = %author_id, sender = %peer.key(), "friend request removed");
    no_content()
}

pub fn accept_friend_request(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    sender: &str,
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let segment = Peer::parse(sender).key();

    let sender_key = state.store.transaction::<_, ApiError>(|tx| {
        let sender_key = find_request_key(tx, author_id, &segment)?;
        let request = get_request(tx, author_id, &sender_key)?
            .ok_or_else(|| ApiError::not_found("Friend request not found"))?;
        delete_request(tx, author_id, &sender_key)?;

        match &request.sender {
            RequestSender::Local { id } => befriend(tx, author_id, *id)?,
            RequestSender::Remote { id, .. } => {
                let mut author = get_author(tx, author_id)?;
                author.remote_friends.insert(id);
                save_author(tx, &author)?;
            }
        }
        Ok(sender_key)
    })?;

    info!(receiver = %author_id, sender = %sender_key, "friend request accepted");
    success()
}
