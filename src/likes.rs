use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_author, validate_token};
use crate::comments::get_comment;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{json, now, ok, parse_uuid};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::models::{Like, LikeTarget, Post};
use crate::posts::{can_view, get_visible_post};
use crate::serializers::{like_json, list, LikeJson};
use crate::state::AppState;

// === Store operations ===

fn target_list_key(target: &LikeTarget) -> String {
    match target {
        LikeTarget::Post { post_id } => post_likes_key(post_id),
        LikeTarget::Comment { comment_id, .. } => comment_likes_key(comment_id),
    }
}

fn load_likes(tx: &Transaction<'_>, list_key: &str) -> anyhow::Result<Vec<Like>> {
    let mut likes = Vec::new();
    for id in tx.get_list(list_key)? {
        if let Some(like) = tx.get_json::<Like>(&like_key(&id))? {
            likes.push(like);
        }
    }
    Ok(likes)
}

pub fn author_likes(tx: &Transaction<'_>, author_id: Uuid) -> anyhow::Result<Vec<Like>> {
    load_likes(tx, &liked_key(author_id))
}

/// Records a like unless the author already likes the target.
/// Returns the like and whether it was created.
pub fn add_like(
    tx: &mut Transaction<'_>,
    author_id: Uuid,
    target: LikeTarget,
) -> anyhow::Result<(Like, bool)> {
    if let Some(existing) = author_likes(tx, author_id)?
        .into_iter()
        .find(|l| l.target == target)
    {
        return Ok((existing, false));
    }

    let like = Like {
        id: Uuid::new_v4(),
        author_id,
        target,
        published: now(),
    };
    tx.set_json(&like_key(like.id), &like)?;
    tx.push_list(&target_list_key(&target), &like.id.to_string())?;
    tx.push_list(&liked_key(author_id), &like.id.to_string())?;
    Ok((like, true))
}

pub fn remove_like(tx: &mut Transaction<'_>, like_id: Uuid) -> anyhow::Result<()> {
    let Some(like) = tx.get_json::<Like>(&like_key(like_id))? else {
        return Ok(());
    };
    let id = like_id.to_string();
    tx.remove_from_list(&liked_key(like.author_id), &id)?;
    tx.remove_from_list(&target_list_key(&like.target), &id)?;
    tx.delete(&like_key(like_id))
}

fn resolve_target(
    tx: &Transaction<'_>,
    viewer: Option<Uuid>,
    author_id: Uuid,
    post_id: Uuid,
    comment_id: Option<Uuid>,
) -> ApiResult<LikeTarget> {
    let post = get_visible_post(tx, viewer, author_id, post_id)?;
    Ok(match comment_id {
        Some(comment_id) => {
            let comment = get_comment(tx, &post, comment_id)?;
            LikeTarget::Comment {
                post_id: post.id,
                comment_id: comment.id,
            }
        }
        None => LikeTarget::Post { post_id: post.id },
    })
}

fn likes_json(tx: &Transaction<'_>, state: &AppState, likes: &[Like]) -> anyhow::Result<Vec<LikeJson>> {
    likes.iter().map(|l| like_json(tx, &state.config, l)).collect()
}

// === HTTP Handlers ===

/// Likes a post, or one of its comments when `comment_id` is given.
pub fn like(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    comment_id: Option<&str>,
) -> ApiResult<HttpResponse> {
    let liker = require_author(state, req)?;
    let post_id = parse_uuid(post_id, "Post")?;
    let comment_id = comment_id.map(|c| parse_uuid(c, "Comment")).transpose()?;

    let (body, created) = state.store.transaction::<_, ApiError>(|tx| {
        let target = resolve_target(tx, Some(liker), author_id, post_id, comment_id)?;
        let (like, created) = add_like(tx, liker, target)?;
        if created {
            info!(like = %like.id, author = %liker, "like recorded");
        }
        Ok((like_json(tx, &state.config, &like)?, created))
    })?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(json(status, &body))
}

pub fn list_likes(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    comment_id: Option<&str>,
    query: &str,
) -> ApiResult<HttpResponse> {
    let post_id = parse_uuid(post_id, "Post")?;
    let comment_id = comment_id.map(|c| parse_uuid(c, "Comment")).transpose()?;
    let viewer = validate_token(state, req);
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let target = resolve_target(tx, viewer, author_id, post_id, comment_id)?;
        let likes = page.apply(load_likes(tx, &target_list_key(&target))?);
        Ok(likes_json(tx, state, &likes)?)
    })?;

    ok(&list("likes", items))
}

/// Everything `author_id` liked that the viewer may still see.
pub fn list_liked(state: &AppState, req: &HttpRequest, author_id: Uuid, query: &str) -> ApiResult<HttpResponse> {
    let viewer = validate_token(state, req);
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        crate::authors::get_author(tx, author_id)?;
        let mut visible = Vec::new();
        for like in author_likes(tx, author_id)? {
            let post: Option<Post> = tx.get_json(&post_key(like.target.post_id()))?;
            if let Some(post) = post {
                if can_view(tx, &post, viewer)? {
                    visible.push(like);
                }
            }
        }
        Ok(likes_json(tx, state, &page.apply(visible))?)
    })?;

    ok(&list("liked", items))
}
