mod author;
mod comment;
mod friend_request;
mod like;
mod post;
mod token;

pub use author::{Author, RemoteIdSet};
pub use comment::Comment;
pub use friend_request::{FriendRequest, RequestSender};
pub use like::{Like, LikeTarget};
pub use post::{ContentType, Post, PostAuthor, Visibility};
pub use token::TokenData;
