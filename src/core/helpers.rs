use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::{ApiError, ApiResult};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn parse_uuid(id: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound(format!("{what} not found")))
}

/// Matches a federated author reference against a local author id.
///
/// Remote nodes send either the bare uuid or the author URL
/// (`https://host/author/<uuid>`, optionally with a trailing slash).
pub fn refers_to_author(raw: &str, id: Uuid) -> bool {
    let raw = raw.trim().trim_end_matches('/');
    let last = raw.rsplit('/').next().unwrap_or(raw);
    Uuid::parse_str(last).map(|parsed| parsed == id).unwrap_or(false)
}

pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Request body required"));
    }
    Ok(serde_json::from_slice(body)?)
}

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    HttpResponse::build(status).json(value)
}

pub fn ok<T: Serialize>(value: &T) -> ApiResult<HttpResponse> {
    Ok(json(StatusCode::OK, value))
}

pub fn created<T: Serialize>(value: &T) -> ApiResult<HttpResponse> {
    Ok(json(StatusCode::CREATED, value))
}

pub fn no_content() -> ApiResult<HttpResponse> {
    Ok(HttpResponse::NoContent().finish())
}

pub fn success() -> ApiResult<HttpResponse> {
    ok(&serde_json::json!({ "message": "success" }))
}
