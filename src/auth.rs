use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{now, ok, parse_body, verify_password};
use crate::core::store::Transaction;
use crate::models::{Author, TokenData};
use crate::state::AppState;

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub fn issue_token(tx: &mut Transaction<'_>, author_id: Uuid) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        author_id,
        created_at: now(),
    };
    tx.set_json(&token_key(&token), &data)?;
    tx.push_list(TOKENS_LIST_KEY, &token)?;
    Ok(token)
}

/// Drops every token belonging to `author_id`.
pub fn revoke_tokens(tx: &mut Transaction<'_>, author_id: Uuid) -> anyhow::Result<()> {
    for token in tx.get_list(TOKENS_LIST_KEY)? {
        let key = token_key(&token);
        let owned = tx
            .get_json::<TokenData>(&key)?
            .map(|data| data.author_id == author_id)
            .unwrap_or(true);
        if owned {
            drop_token(tx, &token)?;
        }
    }
    Ok(())
}

fn is_expired(data: &TokenData, max_age_hours: i64) -> bool {
    (now() - data.created_at).num_hours() > max_age_hours
}

fn drop_token(tx: &mut Transaction<'_>, token: &str) -> anyhow::Result<()> {
    tx.delete(&token_key(token))?;
    tx.remove_from_list(TOKENS_LIST_KEY, token)
}

/// Removes expired and dangling tokens so the token index stays bounded.
pub fn prune_expired_tokens(tx: &mut Transaction<'_>, max_age_hours: i64) -> anyhow::Result<usize> {
    let mut pruned = 0;
    for token in tx.get_list(TOKENS_LIST_KEY)? {
        let stale = tx
            .get_json::<TokenData>(&token_key(&token))?
            .map_or(true, |data| is_expired(&data, max_age_hours));
        if stale {
            drop_token(tx, &token)?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

pub fn login_user(state: &AppState, body: &[u8]) -> ApiResult<HttpResponse> {
    let creds: Credentials = parse_body(body)?;

    let resp = state.store.transaction::<_, ApiError>(|tx| {
        let author_id: Option<Uuid> = tx.get_json(&username_key(&creds.username))?;
        let author = match author_id {
            Some(id) => tx.get_json::<Author>(&author_key(id))?,
            None => None,
        };

        match author {
            Some(a) if verify_password(&creds.password, &a.password) => {
                let pruned = prune_expired_tokens(tx, state.config.token_expiration_hours)?;
                if pruned > 0 {
                    debug!(pruned, "expired tokens removed");
                }
                let token = issue_token(tx, a.id)?;
                info!(author = %a.id, "author logged in");
                Ok(serde_json::json!({
                    "token": token,
                    "author_id": a.id,
                }))
            }
            _ => Err(ApiError::Unauthorized),
        }
    })?;

    ok(&resp)
}

pub fn logout_user(state: &AppState, req: &HttpRequest) -> ApiResult<HttpResponse> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;

    state.store.transaction::<_, ApiError>(|tx| {
        let key = token_key(token);
        if !tx.exists(&key) {
            return Err(ApiError::Unauthorized);
        }
        drop_token(tx, token)?;
        Ok(())
    })?;

    ok(&serde_json::json!({ "message": "Logged out successfully" }))
}

pub fn validate_token(state: &AppState, req: &HttpRequest) -> Option<Uuid> {
    let token = bearer_token(req)?;

    let result: anyhow::Result<Option<Uuid>> = state.store.transaction(|tx| {
        let Some(data) = tx.get_json::<TokenData>(&token_key(token))? else {
            return Ok(None);
        };
        // Expired or orphaned tokens are dropped on sight
        if is_expired(&data, state.config.token_expiration_hours) || !tx.exists(&author_key(data.author_id)) {
            drop_token(tx, token)?;
            return Ok(None);
        }
        Ok(Some(data.author_id))
    });

    result.ok().flatten()
}

pub fn require_author(state: &AppState, req: &HttpRequest) -> ApiResult<Uuid> {
    validate_token(state, req).ok_or(ApiError::Unauthorized)
}

/// The request must be authenticated as `author_id` itself.
pub fn require_owner(state: &AppState, req: &HttpRequest, author_id: Uuid) -> ApiResult<()> {
    match validate_token(state, req) {
        Some(id) if id == author_id => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// HTTP basic authentication of a remote node, enforced only when
/// `require_node_auth` is configured.
pub fn require_node(state: &AppState, req: &HttpRequest) -> ApiResult<()> {
    if !state.config.require_node_auth {
        return Ok(());
    }

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|raw| String::from_utf8(raw).ok());

    let authorized = presented
        .as_deref()
        .and_then(|pair| pair.split_once(':'))
        .map(|(user, pass)| {
            state
                .config
                .node_credentials
                .iter()
                .any(|(u, p)| u == user && p == pass)
        })
        .unwrap_or(false);

    if authorized {
        Ok(())
    } else {
        warn!(peer = ?req.peer_addr(), "rejected unauthenticated node request");
        Err(ApiError::Unauthorized)
    }
}
