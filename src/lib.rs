pub mod auth;
pub mod authors;
pub mod comments;
pub mod config;
pub mod follow;
pub mod handlers;
pub mod inbox;
pub mod likes;
pub mod models;
pub mod nodes;
pub mod posts;
pub mod serializers;
pub mod state;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
    pub mod store;
}
