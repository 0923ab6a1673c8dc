use actix_web::{HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_author, validate_token};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{created, now, ok, parse_body, parse_uuid};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::likes::remove_like;
use crate::models::{Comment, ContentType, Post};
use crate::posts::{get_visible_post, prepare_content};
use crate::serializers::{comment_json, list};
use crate::state::AppState;

// === Store operations ===

pub fn get_comment(tx: &Transaction<'_>, post: &Post, comment_id: Uuid) -> ApiResult<Comment> {
    tx.get_json::<Comment>(&comment_key(comment_id))?
        .filter(|c| c.post_id == post.id)
        .ok_or_else(|| ApiError::not_found("Comment not found"))
}

/// Comments of a post, oldest first.
pub fn post_comments(tx: &Transaction<'_>, post_id: Uuid) -> anyhow::Result<Vec<Comment>> {
    let mut comments = Vec::new();
    for id in tx.get_list(&comments_key(post_id))? {
        if let Some(c) = tx.get_json::<Comment>(&comment_key(&id))? {
            comments.push(c);
        }
    }
    comments.sort_by(|a, b| a.published.cmp(&b.published));
    Ok(comments)
}

pub fn delete_comment_cascade(tx: &mut Transaction<'_>, comment_id: Uuid) -> anyhow::Result<()> {
    for like_id in tx.get_list(&comment_likes_key(comment_id))? {
        if let Ok(like_id) = Uuid::parse_str(&like_id) {
            remove_like(tx, like_id)?;
        }
    }
    tx.delete(&comment_likes_key(comment_id))?;

    if let Some(comment) = tx.get_json::<Comment>(&comment_key(comment_id))? {
        tx.remove_from_list(&comments_key(comment.post_id), &comment_id.to_string())?;
    }
    tx.delete(&comment_key(comment_id))
}

// === HTTP Handlers ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentInput {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "content")]
    comment: Option<String>,
    #[serde(alias = "content_type")]
    content_type: Option<String>,
}

pub fn list_comments(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    query: &str,
) -> ApiResult<HttpResponse> {
    let post_id = parse_uuid(post_id, "Post")?;
    let viewer = validate_token(state, req);
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let post = get_visible_post(tx, viewer, author_id, post_id)?;
        page.apply(post_comments(tx, post.id)?)
            .iter()
            .map(|c| comment_json(tx, &state.config, &post, c).map_err(ApiError::from))
            .collect::<ApiResult<Vec<_>>>()
    })?;

    ok(&list("comments", items))
}

pub fn create_comment(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    let commenter = require_author(state, req)?;
    let post_id = parse_uuid(post_id, "Post")?;
    let input: CommentInput = parse_body(body)?;

    if let Some(kind) = &input.kind {
        if !kind.eq_ignore_ascii_case("comment") {
            return Err(ApiError::bad_request("type must be \"comment\""));
        }
    }
    let content_type: ContentType = match &input.content_type {
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
        None => ContentType::Plain,
    };
    if content_type.is_binary() {
        return Err(ApiError::bad_request("Comments must be text"));
    }
    let text = input.comment.as_deref().unwrap_or_default().trim();
    if text.is_empty() || text.len() > MAX_COMMENT_LENGTH {
        return Err(ApiError::bad_request("Invalid comment"));
    }
    let content = prepare_content(content_type, text)?;

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let post = get_visible_post(tx, Some(commenter), author_id, post_id)?;

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: post.id,
            author_id: commenter,
            content,
            content_type,
            published: now(),
        };
        tx.set_json(&comment_key(comment.id), &comment)?;
        tx.push_list(&comments_key(post.id), &comment.id.to_string())?;

        info!(post = %post.id, comment = %comment.id, author = %commenter, "comment added");
        Ok(comment_json(tx, &state.config, &post, &comment)?)
    })?;

    created(&body)
}

pub fn get_comment_details(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    comment_id: &str,
) -> ApiResult<HttpResponse> {
    let post_id = parse_uuid(post_id, "Post")?;
    let comment_id = parse_uuid(comment_id, "Comment")?;
    let viewer = validate_token(state, req);

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let post = get_visible_post(tx, viewer, author_id, post_id)?;
        let comment = get_comment(tx, &post, comment_id)?;
        Ok(comment_json(tx, &state.config, &post, &comment)?)
    })?;

    ok(&body)
}
