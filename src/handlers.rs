use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use tracing::debug;
use uuid::Uuid;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::parse_uuid;
use crate::follow::Relation;
use crate::state::AppState;
use crate::{auth, authors, comments, follow, inbox, likes, nodes, posts};

/// Single entry point for every request, mounted as the app's default service.
pub async fn handle_all(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let path = req.path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = route(&state, &req, &segments, &body).await;
    let response = match result {
        Ok(response) => response,
        Err(e) => e.error_response(),
    };

    debug!(method = %req.method(), path = %path, status = response.status().as_u16(), "handled request");
    response
}

fn not_allowed() -> ApiResult<HttpResponse> {
    Err(ApiError::MethodNotAllowed)
}

async fn route(state: &AppState, req: &HttpRequest, segments: &[&str], body: &[u8]) -> ApiResult<HttpResponse> {
    let method = req.method().as_str();
    let query = req.query_string();

    match segments {
        ["signup"] => match method {
            "POST" => authors::create_author(state, body),
            _ => not_allowed(),
        },
        ["login"] => match method {
            "POST" => auth::login_user(state, body),
            _ => not_allowed(),
        },
        ["logout"] => match method {
            "POST" => auth::logout_user(state, req),
            _ => not_allowed(),
        },
        ["authors"] => match method {
            "GET" => authors::list_authors(state, query),
            _ => not_allowed(),
        },
        ["authors", "search", needle] => match method {
            "GET" => authors::search_authors(state, needle),
            _ => not_allowed(),
        },
        ["posts"] => match method {
            "GET" => posts::list_public_posts(state, query),
            _ => not_allowed(),
        },
        ["stream"] => match method {
            "GET" => posts::stream(state, req, query),
            _ => not_allowed(),
        },
        ["nodes", "authors"] => match method {
            "GET" => nodes::remote_authors(state).await,
            _ => not_allowed(),
        },
        ["author", id, rest @ ..] => {
            let author_id = parse_uuid(id, "Author")?;
            route_author(state, req, author_id, rest, body).await
        }
        _ => Err(ApiError::not_found("No route found")),
    }
}

/// Routes below `/author/{id}`.
async fn route_author(
    state: &AppState,
    req: &HttpRequest,
    author_id: Uuid,
    rest: &[&str],
    body: &[u8],
) -> ApiResult<HttpResponse> {
    let method = req.method().as_str();
    let query = req.query_string();

    match (method, rest) {
        ("GET", []) => authors::get_author_details(state, author_id),
        ("POST", []) => authors::update_profile(state, req, author_id, body),

        // Posts
        ("GET", ["posts"]) => posts::list_author_posts(state, req, author_id, query),
        ("POST", ["posts"]) => posts::create_post(state, req, author_id, body),
        ("GET", ["posts", pid]) => posts::get_post_details(state, req, author_id, pid),
        ("PUT", ["posts", pid]) => posts::put_post(state, req, author_id, pid, body),
        ("POST", ["posts", pid]) => posts::update_post(state, req, author_id, pid, body),
        ("DELETE", ["posts", pid]) => posts::delete_post(state, req, author_id, pid),
        ("POST", ["posts", pid, "share"]) => posts::share_post(state, req, author_id, pid),

        // Comments
        ("GET", ["posts", pid, "comments"]) => comments::list_comments(state, req, author_id, pid, query),
        ("POST", ["posts", pid, "comments"]) => comments::create_comment(state, req, author_id, pid, body),
        ("GET", ["posts", pid, "comments", cid]) => {
            comments::get_comment_details(state, req, author_id, pid, cid)
        }

        // Likes
        ("GET", ["posts", pid, "likes"]) => likes::list_likes(state, req, author_id, pid, None, query),
        ("POST", ["posts", pid, "likes"]) => likes::like(state, req, author_id, pid, None),
        ("GET", ["posts", pid, "comments", cid, "likes"]) => {
            likes::list_likes(state, req, author_id, pid, Some(*cid), query)
        }
        ("POST", ["posts", pid, "comments", cid, "likes"]) => likes::like(state, req, author_id, pid, Some(*cid)),
        ("GET", ["liked"]) => likes::list_liked(state, req, author_id, query),

        // Followers, following, friends
        ("GET", ["followers"]) => follow::list_relation(state, author_id, Relation::Followers, query),
        ("GET", ["followers", fid]) => follow::get_relation(state, author_id, Relation::Followers, fid),
        ("PUT", ["followers", fid]) => follow::put_follower(state, req, author_id, fid),
        ("DELETE", ["followers", fid]) => follow::delete_follower(state, req, author_id, fid),
        ("GET", ["following"]) => follow::list_relation(state, author_id, Relation::Following, query),
        ("GET", ["following", fid]) => follow::get_relation(state, author_id, Relation::Following, fid),
        ("GET", ["friends"]) => follow::list_relation(state, author_id, Relation::Friends, query),
        ("GET", ["friends", fid]) => follow::get_relation(state, author_id, Relation::Friends, fid),
        ("PUT", ["friends", fid]) => follow::put_friend(state, req, author_id, fid),
        ("DELETE", ["friends", fid]) => follow::delete_friend(state, req, author_id, fid),

        // Friend requests
        ("GET", ["requests"]) => follow::list_requests(state, req, author_id, query),
        ("GET", ["requests", sender]) => follow::get_friend_request(state, req, author_id, sender),
        ("PUT", ["requests", sender]) => follow::put_friend_request(state, req, author_id, sender, body),
        ("DELETE", ["requests", sender]) => follow::delete_friend_request(state, req, author_id, sender),
        ("POST", ["requests", sender, "accept"]) => follow::accept_friend_request(state, req, author_id, sender),

        // Federation
        ("GET", ["inbox"]) => inbox::get_inbox(state, req, author_id, query),
        ("POST", ["inbox"]) => inbox::post_to_inbox(state, req, author_id, body),
        ("DELETE", ["inbox"]) => inbox::clear_inbox(state, req, author_id),
        ("POST", ["remote_follow"]) => nodes::remote_follow(state, req, author_id, body).await,

        (_, rest) if is_author_route(rest) => not_allowed(),
        _ => Err(ApiError::not_found("No route found")),
    }
}

fn is_author_route(rest: &[&str]) -> bool {
    matches!(
        rest,
        []
            | ["posts"]
            | ["posts", _]
            | ["posts", _, "share" | "comments" | "likes"]
            | ["posts", _, "comments", _]
            | ["posts", _, "comments", _, "likes"]
            | ["liked" | "followers" | "following" | "friends" | "requests" | "inbox" | "remote_follow"]
            | ["followers" | "following" | "friends" | "requests", _]
            | ["requests", _, "accept"]
    )
}
