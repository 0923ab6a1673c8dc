use std::collections::HashSet;

use actix_web::{HttpRequest, HttpResponse};
use ammonia::Builder;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{issue_token, require_owner, revoke_tokens};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{created, hash_password, now, ok, parse_body, verify_password};
use crate::core::query_params::Page;
use crate::core::store::Transaction;
use crate::models::Author;
use crate::serializers::{author_json, list, AuthorJson};
use crate::state::AppState;

pub fn sanitize_text(text: &str) -> String {
    // Plain text only: strip every tag
    Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string()
}

// === Store operations ===

pub fn get_author(tx: &Transaction<'_>, id: Uuid) -> ApiResult<Author> {
    tx.get_json(&author_key(id))?
        .ok_or_else(|| ApiError::not_found("Author not found"))
}

pub fn save_author(tx: &mut Transaction<'_>, author: &Author) -> anyhow::Result<()> {
    tx.set_json(&author_key(author.id), author)
}

pub fn all_authors(tx: &Transaction<'_>) -> anyhow::Result<Vec<Author>> {
    let mut authors = Vec::new();
    for id in tx.get_list(AUTHORS_LIST_KEY)? {
        if let Some(a) = tx.get_json::<Author>(&author_key(&id))? {
            authors.push(a);
        }
    }
    Ok(authors)
}

/// Resolves a bare uuid or an `.../author/{uuid}` reference to a stored author.
pub fn find_local_author(tx: &Transaction<'_>, raw: &str) -> Option<Uuid> {
    let last = raw.trim().trim_end_matches('/').rsplit('/').next()?;
    let id = Uuid::parse_str(last).ok()?;
    tx.exists(&author_key(id)).then_some(id)
}

pub fn insert_author(
    tx: &mut Transaction<'_>,
    username: &str,
    password: &str,
    host: &str,
) -> ApiResult<Author> {
    if tx.exists(&username_key(username)) {
        return Err(ApiError::Conflict("Username exists".to_string()));
    }

    let author = Author::new(username, hash_password(password)?, host, now());
    save_author(tx, &author)?;
    tx.set_json(&username_key(username), &author.id)?;
    tx.push_list(AUTHORS_LIST_KEY, &author.id.to_string())?;
    Ok(author)
}

// === HTTP Handlers ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Signup {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    display_name: Option<String>,
    github: Option<String>,
}

pub fn create_author(state: &AppState, body: &[u8]) -> ApiResult<HttpResponse> {
    let signup: Signup = parse_body(body)?;
    let username = signup.username.trim();

    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::bad_request("Username must be 3-50 characters"));
    }
    if signup.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }
    if signup.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request("Password must be at least 3 characters"));
    }

    // Sanitize username at input time
    let sanitized_username = sanitize_text(username);
    if sanitized_username != username {
        return Err(ApiError::bad_request("Username may not contain markup"));
    }

    let body = state.store.transaction::<_, ApiError>(|tx| {
        let mut author = insert_author(tx, &sanitized_username, &signup.password, &state.config.host)?;
        if let Some(name) = signup.display_name.as_deref().map(sanitize_text) {
            if !name.is_empty() {
                author.display_name = truncate(&name, MAX_DISPLAY_NAME_LENGTH);
            }
        }
        if let Some(github) = signup.github.as_deref().map(sanitize_text) {
            author.github = truncate(&github, MAX_GITHUB_LENGTH);
        }
        save_author(tx, &author)?;

        info!(author = %author.id, username = %author.username, "author signed up");
        Ok(author_json(&state.config, &author))
    })?;

    created(&body)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn list_authors(state: &AppState, query: &str) -> ApiResult<HttpResponse> {
    let page = Page::from_query(query);
    let items = state.store.transaction::<_, ApiError>(|tx| {
        let authors = all_authors(tx)?;
        Ok(page
            .apply(authors)
            .iter()
            .map(|a| author_json(&state.config, a))
            .collect::<Vec<_>>())
    })?;

    ok(&list("authors", items))
}

pub fn search_authors(state: &AppState, query: &str) -> ApiResult<HttpResponse> {
    let needle = urlencoding::decode(query)
        .map(|q| q.to_lowercase())
        .unwrap_or_else(|_| query.to_lowercase());

    let items = state.store.transaction::<_, ApiError>(|tx| {
        Ok(all_authors(tx)?
            .iter()
            .filter(|a| a.username.to_lowercase().contains(&needle))
            .map(|a| author_json(&state.config, a))
            .collect::<Vec<AuthorJson>>())
    })?;

    ok(&list("authors", items))
}

pub fn get_author_details(state: &AppState, author_id: Uuid) -> ApiResult<HttpResponse> {
    let body = state
        .store
        .transaction::<_, ApiError>(|tx| Ok(author_json(&state.config, &get_author(tx, author_id)?)))?;
    ok(&body)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate {
    display_name: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    github: Option<String>,
    #[serde(alias = "birth_date")]
    birth_date: Option<NaiveDate>,
    #[serde(alias = "old_password")]
    old_password: Option<String>,
    #[serde(alias = "new_password")]
    new_password: Option<String>,
}

fn bounded(field: &str, value: &str, max: usize) -> ApiResult<String> {
    if value.chars().count() > max {
        return Err(ApiError::BadRequest(format!("{field} too long (max {max} chars)")));
    }
    Ok(sanitize_text(value))
}

pub fn update_profile(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    body: &[u8],
) -> ApiResult<HttpResponse> {
    require_owner(state, req, author_id)?;
    let update: ProfileUpdate = parse_body(body)?;

    let response_data = state.store.transaction::<_, ApiError>(|tx| {
        let mut author = get_author(tx, author_id)?;

        if let Some(name) = &update.display_name {
            let name = bounded("displayName", name, MAX_DISPLAY_NAME_LENGTH)?;
            if name.is_empty() {
                return Err(ApiError::bad_request("displayName may not be empty"));
            }
            author.display_name = name;
        }
        if let Some(bio) = &update.bio {
            author.bio = bounded("Bio", bio, MAX_BIO_LENGTH)?;
        }
        if let Some(location) = &update.location {
            author.location = bounded("Location", location, MAX_LOCATION_LENGTH)?;
        }
        if let Some(github) = &update.github {
            author.github = bounded("Github", github, MAX_GITHUB_LENGTH)?;
        }
        if update.birth_date.is_some() {
            author.birth_date = update.birth_date;
        }

        let mut new_token = None;
        if let Some(new_password) = &update.new_password {
            if new_password.len() < MIN_PASSWORD_LENGTH {
                return Err(ApiError::bad_request("Password must be 3+ characters"));
            }
            let old_password = update
                .old_password
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("Current password required"))?;
            if !verify_password(old_password, &author.password) {
                return Err(ApiError::Unauthorized);
            }

            author.password = hash_password(new_password)?;
            // Invalidate all tokens for this author and issue a new one
            revoke_tokens(tx, author_id)?;
            new_token = Some(issue_token(tx, author_id)?);
        }

        save_author(tx, &author)?;

        let mut response_data = serde_json::to_value(author_json(&state.config, &author))?;
        if let Some(token) = new_token {
            response_data["token"] = serde_json::Value::String(token);
        }
        Ok(response_data)
    })?;

    info!(author = %author_id, "profile updated");
    ok(&response_data)
}
