use std::sync::OnceLock;

use actix_web::{HttpRequest, HttpResponse};
use ammonia::Builder;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use html_escape::encode_double_quoted_attribute;
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_author, require_owner, validate_token};
use crate::authors::{find_local_author, get_author, sanitize_text};
use crate::comments::delete_comment_cascade;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{created, no_content, now, ok, parse_body, parse_uuid};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::likes::remove_like;
use crate::models::{Author, ContentType, Post, PostAuthor, Visibility};
use crate::serializers::{list, post_json, post_url, posts_json};
use crate::state::AppState;

const MAX_CATEGORY_LENGTH: usize = 50;

// === Content filtering ===

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile"))
}

fn tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("Regex should compile"))
}

fn linkify(text: &str) -> String {
    url_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let url = &caps[0];
            let escaped_url = encode_double_quoted_attribute(url);
            format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
        })
        .to_string()
}

fn filter_post_content(content: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // Only bare URLs in text become links: tags and existing anchors are
    // copied through untouched
    let mut out = String::with_capacity(clean.len());
    let mut anchor_depth = 0usize;
    let mut last = 0;
    for tag in tag_regex().find_iter(&clean) {
        let text = &clean[last..tag.start()];
        if anchor_depth == 0 {
            out.push_str(&linkify(text));
        } else {
            out.push_str(text);
        }

        let lower = tag.as_str().to_ascii_lowercase();
        if lower.starts_with("<a ") || lower == "<a>" {
            anchor_depth += 1;
        } else if lower.starts_with("</a") {
            anchor_depth = anchor_depth.saturating_sub(1);
        }
        out.push_str(tag.as_str());
        last = tag.end();
    }
    let rest = &clean[last..];
    if anchor_depth == 0 {
        out.push_str(&linkify(rest));
    } else {
        out.push_str(rest);
    }
    out
}

/// Normalizes post content for storage according to its content type.
pub fn prepare_content(content_type: ContentType, content: &str) -> ApiResult<String> {
    if content.len() > MAX_POST_LENGTH {
        return Err(ApiError::bad_request("Invalid content"));
    }

    match content_type {
        ContentType::Plain => Ok(filter_post_content(content)),
        // Markdown is stored as written; rendering happens client side
        ContentType::Markdown => Ok(content.to_string()),
        ContentType::Base64 | ContentType::Png | ContentType::Jpeg => {
            let payload = content.trim();
            STANDARD
                .decode(payload)
                .map_err(|_| ApiError::bad_request("Content is not valid base64"))?;
            Ok(payload.to_string())
        }
    }
}

// === Store operations ===

pub fn get_post(tx: &Transaction<'_>, post_id: Uuid) -> ApiResult<Post> {
    tx.get_json(&post_key(post_id))?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

/// Loads a post addressed as `/author/{author_id}/posts/{post_id}`.
pub fn get_authored_post(tx: &Transaction<'_>, author_id: Uuid, post_id: Uuid) -> ApiResult<Post> {
    let post = get_post(tx, post_id)?;
    if !post.is_owned_by(author_id) {
        return Err(ApiError::not_found("Post not found"));
    }
    Ok(post)
}

pub fn insert_post(tx: &mut Transaction<'_>, post: &Post) -> anyhow::Result<()> {
    tx.set_json(&post_key(post.id), post)?;
    tx.prepend_list(FEED_KEY, &post.id.to_string())
}

/// Deletes a post with its comments, likes and index entries.
pub fn delete_post_cascade(tx: &mut Transaction<'_>, post: &Post) -> anyhow::Result<()> {
    for comment_id in tx.get_list(&comments_key(post.id))? {
        if let Ok(comment_id) = Uuid::parse_str(&comment_id) {
            delete_comment_cascade(tx, comment_id)?;
        }
    }
    tx.delete(&comments_key(post.id))?;

    for like_id in tx.get_list(&post_likes_key(post.id))? {
        if let Ok(like_id) = Uuid::parse_str(&like_id) {
            remove_like(tx, like_id)?;
        }
    }
    tx.delete(&post_likes_key(post.id))?;

    if let (Some(remote_id), Some(receiver)) = (&post.remote_id, post.to_author) {
        tx.delete(&inbox_post_key(receiver, remote_id))?;
    }

    tx.remove_from_list(FEED_KEY, &post.id.to_string())?;
    tx.delete(&post_key(post.id))
}

/// Every stored post, newest first.
pub fn all_posts(tx: &Transaction<'_>) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::new();
    for id in tx.get_list(FEED_KEY)? {
        if let Some(p) = tx.get_json::<Post>(&post_key(&id))? {
            posts.push(p);
        }
    }
    sort_newest_first(&mut posts);
    Ok(posts)
}

pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.published.cmp(&a.published));
}

/// Visibility rule shared by every read path.
pub fn can_view(tx: &Transaction<'_>, post: &Post, viewer: Option<Uuid>) -> anyhow::Result<bool> {
    if post.visibility == Visibility::Public {
        return Ok(true);
    }
    let Some(viewer) = viewer else {
        return Ok(false);
    };
    if post.is_owned_by(viewer) || post.to_author == Some(viewer) {
        return Ok(true);
    }

    match (post.visibility, post.author.local_id()) {
        (Visibility::Friends, Some(owner_id)) => {
            let owner: Option<Author> = tx.get_json(&author_key(owner_id))?;
            Ok(owner
                .map(|o| o.followers.contains(&viewer) || o.friends.contains(&viewer))
                .unwrap_or(false))
        }
        _ => Ok(false),
    }
}

/// Loads `/author/{author_id}/posts/{post_id}` if the viewer may read it,
/// failing with 401 otherwise.
pub fn get_visible_post(
    tx: &Transaction<'_>,
    viewer: Option<Uuid>,
    author_id: Uuid,
    post_id: Uuid,
) -> ApiResult<Post> {
    let post = get_authored_post(tx, author_id, post_id)?;
    if !can_view(tx, &post, viewer)? {
        return Err(ApiError::Unauthorized);
    }
    Ok(post)
}

// === HTTP Handlers ===

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PostInput {
    title: Option<String>,
    source: Option<String>,
    origin: Option<String>,
    description: Option<String>,
    #[serde(alias = "content_type")]
    content_type: Option<String>,
    content: Option<String>,
    categories: Option<Vec<String>>,
    visibility: Option<String>,
    unlisted: Option<bool>,
    #[serde(alias = "to_author")]
    to_author: Option<String>,
}

fn apply_input(tx: &Transaction<'_>, post: &mut Post, input: PostInput) -> ApiResult<()> {
    let type_changed = input.content_type.is_some();
    if let Some(title) = input.title {
        let title = sanitize_text(title.trim());
        if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ApiError::bad_request("Title must be 1-200 characters"));
        }
        post.title = title;
    }
    if let Some(source) = input.source {
        post.source = sanitize_text(&source);
    }
    if let Some(origin) = input.origin {
        post.origin = sanitize_text(&origin);
    }
    if let Some(description) = input.description {
        post.description = sanitize_text(&description);
    }
    if let Some(content_type) = input.content_type {
        post.content_type = content_type.parse().map_err(ApiError::BadRequest)?;
    }
    if let Some(content) = input.content {
        post.content = prepare_content(post.content_type, &content)?;
    } else if type_changed && post.content_type.is_binary() {
        // content type changed on its own: the stored content must still decode
        post.content = prepare_content(post.content_type, &post.content)?;
    }
    if let Some(categories) = input.categories {
        post.categories = categories
            .iter()
            .map(|c| sanitize_text(c.trim()))
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(MAX_CATEGORY_LENGTH).collect())
            .collect();
    }
    if let Some(visibility) = input.visibility {
        post.visibility = visibility.parse().map_err(ApiError::BadRequest)?;
    }
    if let Some(unlisted) = input.unlisted {
        post.unlisted = unlisted;
    }
    if let Some(to_author) = input.to_author {
        post.to_author = if to_author.trim().is_empty() {
            None
        } else {
            Some(resolve_local_author(tx, &to_author)?)
        };
    }
    Ok(())
}

fn resolve_local_author(tx: &Transaction<'_>, raw: &str) -> ApiResult<Uuid> {
    find_local_author(tx, raw).ok_or_else(|| ApiError::bad_request("toAuthor must be a local author"))
}

fn blank_post(id: Uuid, author_id: Uuid) -> Post {
    Post {
        id,
        title: String::new(),
        source: String::new(),
        origin: String::new(),
        description: String::new(),
        content_type: ContentType::Plain,
        content: String::new(),
        author: PostAuthor::Local { id: author_id },
        categories: Vec::new(),
        published: now(),
        updated_at: None,
        visibility: Visibility::Public,
        unlisted: false,
        to_author: None,
        remote_id: None,
    }
}

fn create_with_id(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: Uuid,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let input: PostInput = parse_body(body)?;
    if input.title.is_none() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let body = state.store.transaction::<_, ApiError>(|tx| {
        if tx.exists(&post_key(post_id)) {
            return Err(ApiError::Conflict("Post id already in use".to_string()));
        }

        let mut post = blank_post(post_id, author_id);
        apply_input(tx, &mut post, input)?;
        insert_post(tx, &post)?;

        info!(author = %author_id, post = %post.id, visibility = ?post.visibility, "post created");
        Ok(post_json(tx, &state.config, &post)?)
    })?;

    created(&body)
}

pub fn create_post(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    create_with_id(state, req, author_id, Uuid::new_v4(), body)
}

pub fn put_post(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    let post_id = Uuid::parse_str(post_id).map_err(|_| ApiError::bad_request("Post id must be a uuid"))?;
    create_with_id(state, req, author_id, post_id, body)
}

pub fn get_post_details(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
) -> ApiResult<HttpResponse> {
    let post_id = parse_uuid(post_id, "Post")?;
    let viewer = validate_token(state, req);

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let post = get_visible_post(tx, viewer, author_id, post_id)?;
        Ok(post_json(tx, &state.config, &post)?)
    })?;

    ok(&body)
}

pub fn update_post(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    let user_id = require_author(state, req)?;
    let post_id = parse_uuid(post_id, "Post")?;
    let input: PostInput = parse_body(body)?;

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let mut post = get_authored_post(tx, author_id, post_id)?;
        if !post.is_owned_by(user_id) {
            return Err(ApiError::Forbidden);
        }

        apply_input(tx, &mut post, input)?;
        post.updated_at = Some(now());
        tx.set_json(&post_key(post.id), &post)?;

        info!(post = %post.id, "post updated");
        Ok(post_json(tx, &state.config, &post)?)
    })?;

    ok(&body)
}

pub fn delete_post(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
) -> ApiResult<HttpResponse> {
    let user_id = require_author(state, req)?;
    let post_id = parse_uuid(post_id, "Post")?;

    state.store.transaction::<_, ApiError>(|tx| {
        let post = get_authored_post(tx, author_id, post_id)?;
        if !post.is_owned_by(user_id) {
            return Err(ApiError::Forbidden);
        }
        delete_post_cascade(tx, &post)?;
        Ok(())
    })?;

    info!(post = %post_id, "post deleted");
    no_content()
}

pub fn share_post(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    post_id: &str,
) -> ApiResult<HttpResponse> {
    let sharer = require_author(state, req)?;
    let post_id = parse_uuid(post_id, "Post")?;

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let original = get_authored_post(tx, author_id, post_id)?;
        if !can_view(tx, &original, Some(sharer))? {
            return Err(ApiError::Unauthorized);
        }
        if original.visibility == Visibility::Private {
            return Err(ApiError::bad_request("Private posts cannot be shared"));
        }

        let original_author = get_author(tx, author_id)?;
        let original_url = post_url(&state.config, &original);

        let mut shared = blank_post(Uuid::new_v4(), sharer);
        shared.title = format!("{}---Shared from {}", original.title, original_author.display_name);
        shared.source = original_url.clone();
        shared.origin = if original.origin.is_empty() {
            original_url
        } else {
            format!("{};{}", original.origin, original_url)
        };
        shared.description = original.description.clone();
        shared.content_type = original.content_type;
        shared.content = original.content.clone();
        shared.categories = original.categories.clone();
        shared.visibility = original.visibility;
        shared.unlisted = original.unlisted;
        insert_post(tx, &shared)?;

        info!(original = %original.id, shared = %shared.id, "post shared");
        Ok(post_json(tx, &state.config, &shared)?)
    })?;

    created(&body)
}

pub fn list_public_posts(state: &AppState, query: &str) -> ApiResult<HttpResponse> {
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let posts: Vec<Post> = all_posts(tx)?
            .into_iter()
            .filter(Post::is_public_listed)
            .collect();
        Ok(posts_json(tx, &state.config, &page.apply(posts))?)
    })?;

    ok(&list("posts", items))
}

pub fn list_author_posts(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    query: &str,
) -> ApiResult<HttpResponse> {
    let page = Page::from_query(query);
    let viewer = validate_token(state, req);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        get_author(tx, author_id)?;
        let is_owner = viewer == Some(author_id);

        let posts: Vec<Post> = all_posts(tx)?
            .into_iter()
            .filter(|p| p.is_owned_by(author_id))
            // Only the owner sees unlisted and restricted posts here
            .filter(|p| is_owner || p.is_public_listed())
            .collect();
        Ok(posts_json(tx, &state.config, &page.apply(posts))?)
    })?;

    ok(&list("posts", items))
}

/// Home stream: public posts, the viewer's own posts and their friends'
/// FRIENDS posts.
pub fn stream(state: &AppState, req: &HttpRequest, query: &str) -> ApiResult<HttpResponse> {
    let viewer_id = require_author(state, req)?;
    let page = Page::from_query(query);

    let items = state.store.transaction::<_, ApiError>(|tx| {
        let viewer = get_author(tx, viewer_id)?;

        let posts: Vec<Post> = all_posts(tx)?
            .into_iter()
            .filter(|p| !p.unlisted)
            .filter(|p| match (p.visibility, p.author.local_id()) {
                (Visibility::Public, _) => true,
                (_, Some(owner)) if owner == viewer_id => true,
                (Visibility::Friends, Some(owner)) => viewer.is_friend(owner),
                _ => false,
            })
            .collect();
        Ok(posts_json(tx, &state.config, &page.apply(posts))?)
    })?;

    ok(&list("stream", items))
}
