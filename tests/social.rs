mod common;

use common::{item_ids, TestNode};
use distsoc::config::{comment_key, like_key, liked_key};
use distsoc::core::errors::ApiError;
use serde_json::json;

#[tokio::test]
async fn comments_are_listed_oldest_first() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let commenter = node.signup("commenter").await;

    let post = node.create_post(&owner, json!({ "title": "t", "content": "x" })).await;
    let comments_path = format!("/author/{}/posts/{}/comments", owner.id, post["id"].as_str().unwrap());

    let (status, _) = node.post(&comments_path, None, json!({ "type": "comment", "comment": "hi" })).await;
    assert_eq!(status, 401);

    let (status, _) = node
        .post(&comments_path, Some(&commenter.token), json!({ "type": "like", "comment": "hi" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = node
        .post(&comments_path, Some(&commenter.token), json!({ "type": "comment", "comment": "  " }))
        .await;
    assert_eq!(status, 400);

    let (status, first) = node
        .post(&comments_path, Some(&commenter.token), json!({ "type": "comment", "comment": "first" }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(first["type"], "comment");
    assert_eq!(first["author"]["id"], commenter.id);

    let (status, _) = node
        .post(
            &comments_path,
            Some(&owner.token),
            json!({ "type": "comment", "comment": "**second**", "contentType": "text/markdown" }),
        )
        .await;
    assert_eq!(status, 201);

    let (status, list) = node.get(&comments_path, None).await;
    assert_eq!(status, 200);
    assert_eq!(list["type"], "comments");
    let comments = list["items"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["comment"], "first");
    assert_eq!(comments[1]["comment"], "**second**");

    let (status, one) = node
        .get(&format!("{}/{}", comments_path, first["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(one["id"], first["id"]);

    let (status, _) = node.get(&format!("{}/{}", comments_path, uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn comments_on_hidden_posts_are_refused() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let stranger = node.signup("stranger").await;

    let post = node
        .create_post(&owner, json!({ "title": "t", "content": "x", "visibility": "FRIENDS" }))
        .await;
    let comments_path = format!("/author/{}/posts/{}/comments", owner.id, post["id"].as_str().unwrap());

    let (status, _) = node.get(&comments_path, Some(&stranger.token)).await;
    assert_eq!(status, 401);
    let (status, _) = node
        .post(&comments_path, Some(&stranger.token), json!({ "type": "comment", "comment": "hi" }))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn liking_twice_keeps_one_like() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let fan = node.signup("fan").await;

    let post = node.create_post(&owner, json!({ "title": "t", "content": "x" })).await;
    let likes_path = format!("/author/{}/posts/{}/likes", owner.id, post["id"].as_str().unwrap());

    let (status, like) = node.post(&likes_path, Some(&fan.token), json!({})).await;
    assert_eq!(status, 201);
    assert_eq!(like["type"], "Like");
    assert_eq!(like["object"], post["url"]);
    assert_eq!(like["summary"], format!("{} likes your post", fan.username));

    let (status, again) = node.post(&likes_path, Some(&fan.token), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(again["id"], like["id"]);

    let (_, likes) = node.get(&likes_path, None).await;
    assert_eq!(item_ids(&likes), vec![like["id"].as_str().unwrap().to_string()]);

    let (_, post_now) = node
        .get(&format!("/author/{}/posts/{}", owner.id, post["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(post_now["likes"], 1);

    let (status, liked) = node.get(&format!("/author/{}/liked", fan.id), None).await;
    assert_eq!(status, 200);
    assert_eq!(liked["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn comment_likes_point_at_the_comment() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let fan = node.signup("fan").await;

    let post = node.create_post(&owner, json!({ "title": "t", "content": "x" })).await;
    let comments_path = format!("/author/{}/posts/{}/comments", owner.id, post["id"].as_str().unwrap());
    let (_, comment) = node
        .post(&comments_path, Some(&owner.token), json!({ "type": "comment", "comment": "c" }))
        .await;
    let comment_likes = format!("{}/{}/likes", comments_path, comment["id"].as_str().unwrap());

    let (status, like) = node.post(&comment_likes, Some(&fan.token), json!({})).await;
    assert_eq!(status, 201);
    assert_eq!(like["object"], comment["url"]);
    assert_eq!(like["summary"], format!("{} likes your comment", fan.username));

    let (_, likes) = node.get(&comment_likes, None).await;
    assert_eq!(likes["items"].as_array().unwrap().len(), 1);

    // Liking the comment is not liking the post
    let (_, post_likes) = node
        .get(&format!("/author/{}/posts/{}/likes", owner.id, post["id"].as_str().unwrap()), None)
        .await;
    assert!(post_likes["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_post_removes_comments_and_likes_but_not_the_author() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let fan = node.signup("fan").await;

    let post = node.create_post(&owner, json!({ "title": "t", "content": "x" })).await;
    let post_path = format!("/author/{}/posts/{}", owner.id, post["id"].as_str().unwrap());

    let (_, comment) = node
        .post(&format!("{post_path}/comments"), Some(&fan.token), json!({ "type": "comment", "comment": "c" }))
        .await;
    let comment_id = comment["id"].as_str().unwrap().to_string();
    let (_, post_like) = node.post(&format!("{post_path}/likes"), Some(&fan.token), json!({})).await;
    let (_, comment_like) = node
        .post(&format!("{post_path}/comments/{comment_id}/likes"), Some(&owner.token), json!({}))
        .await;

    let (status, _) = node.delete(&post_path, Some(&owner.token)).await;
    assert_eq!(status, 204);

    let (status, _) = node.get(&post_path, Some(&owner.token)).await;
    assert_eq!(status, 404);
    let (status, _) = node.get(&format!("/author/{}", owner.id), None).await;
    assert_eq!(status, 200);

    let (_, liked) = node.get(&format!("/author/{}/liked", fan.id), None).await;
    assert!(liked["items"].as_array().unwrap().is_empty());

    let leftovers = node
        .state
        .store
        .transaction::<_, ApiError>(|tx| {
            Ok((
                tx.exists(&comment_key(&comment_id)),
                tx.exists(&like_key(post_like["id"].as_str().unwrap())),
                tx.exists(&like_key(comment_like["id"].as_str().unwrap())),
                tx.get_list(&liked_key(&owner.id))?.len(),
            ))
        })
        .unwrap();
    assert_eq!(leftovers, (false, false, false, 0));
}

#[tokio::test]
async fn follow_and_friend_edges_stay_consistent() {
    let node = TestNode::start().await;
    let alice = node.signup("alice").await;
    let bob = node.signup("bob").await;

    // Only the follower may add themselves
    let followers_path = format!("/author/{}/followers/{}", bob.id, alice.id);
    let (status, _) = node.put(&followers_path, Some(&bob.token), json!({})).await;
    assert_eq!(status, 401);

    // Friendship needs a follow first
    let (status, _) = node
        .put(&format!("/author/{}/friends/{}", alice.id, bob.id), Some(&alice.token), json!({}))
        .await;
    assert_eq!(status, 404);

    node.befriend(&alice, &bob).await;

    let (status, friends) = node.get(&format!("/author/{}/friends", bob.id), None).await;
    assert_eq!(status, 200);
    assert_eq!(item_ids(&friends), vec![alice.id.clone()]);
    let (_, following) = node.get(&format!("/author/{}/following", bob.id), None).await;
    assert_eq!(item_ids(&following), vec![alice.id.clone()]);
    let (status, _) = node.get(&format!("/author/{}/followers/{}", alice.id, bob.id), None).await;
    assert_eq!(status, 200);

    // Dropping a follow edge ends the friendship
    let (status, _) = node.delete(&followers_path, Some(&alice.token)).await;
    assert_eq!(status, 204);
    let (status, _) = node.get(&format!("/author/{}/friends/{}", alice.id, bob.id), None).await;
    assert_eq!(status, 404);
    let (_, friends) = node.get(&format!("/author/{}/friends", bob.id), None).await;
    assert!(item_ids(&friends).is_empty());

    // Bob still follows Alice
    let (status, _) = node.get(&format!("/author/{}/followers/{}", alice.id, bob.id), None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn local_friend_requests_can_be_accepted() {
    let node = TestNode::start().await;
    let alice = node.signup("alice").await;
    let bob = node.signup("bob").await;

    let (status, _) = node
        .put(&format!("/author/{}/followers/{}", bob.id, alice.id), Some(&alice.token), json!({}))
        .await;
    assert_eq!(status, 200);

    let (status, requests) = node.get(&format!("/author/{}/requests", bob.id), Some(&bob.token)).await;
    assert_eq!(status, 200);
    let items = requests["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "Follow");
    assert_eq!(items[0]["sender"]["id"], alice.id);

    // The sender can look at it, others cannot list them
    let request_path = format!("/author/{}/requests/{}", bob.id, alice.id);
    let (status, _) = node.get(&request_path, Some(&alice.token)).await;
    assert_eq!(status, 200);
    let (status, _) = node.get(&format!("/author/{}/requests", bob.id), Some(&alice.token)).await;
    assert_eq!(status, 401);

    let (status, _) = node.post(&format!("{request_path}/accept"), Some(&bob.token), json!({})).await;
    assert_eq!(status, 200);

    let (status, _) = node.get(&request_path, Some(&bob.token)).await;
    assert_eq!(status, 404);
    let (status, _) = node.get(&format!("/author/{}/friends/{}", alice.id, bob.id), None).await;
    assert_eq!(status, 200);
    let (status, _) = node.get(&format!("/author/{}/friends/{}", bob.id, alice.id), None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn declined_requests_are_gone() {
    let node = TestNode::start().await;
    let alice = node.signup("alice").await;
    let bob = node.signup("bob").await;

    node.put(&format!("/author/{}/followers/{}", bob.id, alice.id), Some(&alice.token), json!({}))
        .await;

    let request_path = format!("/author/{}/requests/{}", bob.id, alice.id);
    let (status, _) = node.delete(&request_path, Some(&bob.token)).await;
    assert_eq!(status, 204);
    let (status, _) = node.delete(&request_path, Some(&bob.token)).await;
    assert_eq!(status, 404);

    let (_, requests) = node.get(&format!("/author/{}/requests", bob.id), Some(&bob.token)).await;
    assert!(requests["items"].as_array().unwrap().is_empty());
}
