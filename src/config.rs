use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::nodes::RemoteNode;

// === Limits ===
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_LOCATION_LENGTH: usize = 30;
pub const MAX_GITHUB_LENGTH: usize = 50;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_POST_LENGTH: usize = 100_000;
pub const MAX_COMMENT_LENGTH: usize = 5_000;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

// === Store keys ===
pub const AUTHORS_LIST_KEY: &str = "authors_list";
pub const FEED_KEY: &str = "feed";
pub const TOKENS_LIST_KEY: &str = "tokens_list";

pub fn author_key(id: impl Display) -> String {
    format!("author:{id}")
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username.to_lowercase())
}

pub fn post_key(id: impl Display) -> String {
    format!("post:{id}")
}

pub fn comment_key(id: impl Display) -> String {
    format!("comment:{id}")
}

pub fn comments_key(post_id: impl Display) -> String {
    format!("comments:{post_id}")
}

pub fn like_key(id: impl Display) -> String {
    format!("like:{id}")
}

pub fn post_likes_key(post_id: impl Display) -> String {
    format!("post_likes:{post_id}")
}

pub fn comment_likes_key(comment_id: impl Display) -> String {
    format!("comment_likes:{comment_id}")
}

pub fn liked_key(author_id: impl Display) -> String {
    format!("liked:{author_id}")
}

pub fn friend_request_key(receiver: impl Display, sender: &str) -> String {
    format!("friend_request:{receiver}:{sender}")
}

pub fn friend_requests_key(receiver: impl Display) -> String {
    format!("friend_requests:{receiver}")
}

pub fn inbox_post_key(receiver: impl Display, remote_id: &str) -> String {
    format!("inbox_post:{receiver}:{remote_id}")
}

pub fn inbox_cleared_key(author_id: impl Display) -> String {
    format!("inbox_cleared:{author_id}")
}

pub fn token_key(token: &str) -> String {
    format!("token:{token}")
}

/// Runtime configuration, read from `DISTSOC_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    /// Public base URL of this node, always ending with `/`.
    pub host: String,
    pub data_file: Option<String>,
    pub token_expiration_hours: i64,
    pub remote_nodes: Vec<RemoteNode>,
    pub node_credentials: Vec<(String, String)>,
    pub require_node_auth: bool,
    pub outbound_timeout: Duration,
    pub seed_demo: bool,
}

impl Config {
    pub fn load() -> Self {
        let remote_nodes = optional("DISTSOC_REMOTE_NODES")
            .map(|raw| parse_remote_nodes(&raw))
            .unwrap_or_default();
        let node_credentials = optional("DISTSOC_NODE_CREDENTIALS")
            .map(|raw| parse_credentials(&raw))
            .unwrap_or_default();

        Self {
            bind: try_load("DISTSOC_BIND", "0.0.0.0:8000"),
            host: normalize_host(&try_load::<String>("DISTSOC_HOST", "http://127.0.0.1:8000/")),
            data_file: optional("DISTSOC_DATA_FILE"),
            token_expiration_hours: try_load("DISTSOC_TOKEN_EXPIRATION_HOURS", "24"),
            remote_nodes,
            node_credentials,
            require_node_auth: try_load("DISTSOC_REQUIRE_NODE_AUTH", "false"),
            outbound_timeout: Duration::from_secs(try_load("DISTSOC_OUTBOUND_TIMEOUT_SECS", "10")),
            seed_demo: try_load("DISTSOC_SEED_DEMO", "false"),
        }
    }

    /// In-memory node with no remote peers, as used by the test suite.
    pub fn local(host: &str) -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            host: normalize_host(host),
            data_file: None,
            token_expiration_hours: 24,
            remote_nodes: Vec::new(),
            node_credentials: Vec::new(),
            require_node_auth: false,
            outbound_timeout: Duration::from_secs(5),
            seed_demo: false,
        }
    }

    pub fn author_url(&self, id: impl Display) -> String {
        format!("{}author/{id}", self.host)
    }

    pub fn post_url(&self, author_id: impl Display, post_id: impl Display) -> String {
        format!("{}author/{author_id}/posts/{post_id}", self.host)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            match default.parse() {
                Ok(value) => value,
                Err(_) => unreachable!("default for {key} must parse"),
            }
        }
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{host}/")
    }
}

pub fn parse_remote_nodes(raw: &str) -> Vec<RemoteNode> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<RemoteNode>() {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("Ignoring remote node {s:?}: {e}");
                None
            }
        })
        .collect()
}

pub fn parse_credentials(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter_map(|pair| {
            let (user, pass) = pair.split_once(':')?;
            if user.is_empty() {
                return None;
            }
            Some((user.to_string(), pass.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_always_ends_with_slash() {
        assert_eq!(normalize_host("https://node.example"), "https://node.example/");
        assert_eq!(normalize_host("https://node.example/"), "https://node.example/");
    }

    #[test]
    fn credentials_skip_malformed_pairs() {
        let creds = parse_credentials("alice:secret, broken ,:nouser,bob:");
        assert_eq!(
            creds,
            vec![
                ("alice".to_string(), "secret".to_string()),
                ("bob".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn remote_nodes_skip_invalid_urls() {
        let nodes = parse_remote_nodes("https://a.example/service/, not a url");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].url.as_str(), "https://a.example/service/");
    }

    #[test]
    fn urls_are_built_from_host() {
        let config = Config::local("http://node.test");
        assert_eq!(config.author_url("abc"), "http://node.test/author/abc");
        assert_eq!(config.post_url("a", "p"), "http://node.test/author/a/posts/p");
    }
}
