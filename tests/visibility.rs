mod common;

use common::{item_ids, TestNode};
use serde_json::json;

#[tokio::test]
async fn private_post_with_recipient_stays_out_of_listings() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let recipient = node.signup("recipient").await;
    let stranger = node.signup("stranger").await;
    node.befriend(&stranger, &owner).await;

    let post = node
        .create_post(
            &owner,
            json!({
                "title": "for your eyes only",
                "content": "secret",
                "visibility": "PRIVATE",
                "toAuthor": node.author_url(&recipient)
            }),
        )
        .await;
    let post_id = post["id"].as_str().unwrap().to_string();
    let post_path = format!("/author/{}/posts/{}", owner.id, post_id);

    // Not in the public listing, not in the author's listing for others
    let (_, public) = node.get("/posts", None).await;
    assert!(!item_ids(&public).contains(&post_id));
    let (_, listed) = node.get(&format!("/author/{}/posts", owner.id), Some(&stranger.token)).await;
    assert!(!item_ids(&listed).contains(&post_id));

    // Not in a friend's stream or inbox
    let (_, stream) = node.get("/stream", Some(&stranger.token)).await;
    assert!(!item_ids(&stream).contains(&post_id));
    let (_, inbox) = node.get(&format!("/author/{}/inbox", stranger.id), Some(&stranger.token)).await;
    assert!(!item_ids(&inbox).contains(&post_id));

    // Readable only by owner and recipient
    let (status, _) = node.get(&post_path, Some(&stranger.token)).await;
    assert_eq!(status, 401);
    let (status, _) = node.get(&post_path, None).await;
    assert_eq!(status, 401);
    let (status, _) = node.get(&post_path, Some(&recipient.token)).await;
    assert_eq!(status, 200);
    let (status, _) = node.get(&post_path, Some(&owner.token)).await;
    assert_eq!(status, 200);

    // The recipient finds it in their inbox
    let (_, inbox) = node.get(&format!("/author/{}/inbox", recipient.id), Some(&recipient.token)).await;
    assert!(item_ids(&inbox).contains(&post_id));

    // The owner still sees it in their own listing
    let (_, own) = node.get(&format!("/author/{}/posts", owner.id), Some(&owner.token)).await;
    assert!(item_ids(&own).contains(&post_id));
}

#[tokio::test]
async fn friends_post_reaches_followers_only() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let follower = node.signup("follower").await;
    let outsider = node.signup("outsider").await;

    let (status, _) = node
        .put(&format!("/author/{}/followers/{}", owner.id, follower.id), Some(&follower.token), json!({}))
        .await;
    assert_eq!(status, 200);

    let post = node
        .create_post(&owner, json!({ "title": "friends", "content": "hi", "visibility": "FRIENDS" }))
        .await;
    let post_id = post["id"].as_str().unwrap().to_string();

    let (status, inbox) = node.get(&format!("/author/{}/inbox", follower.id), Some(&follower.token)).await;
    assert_eq!(status, 200);
    assert!(item_ids(&inbox).contains(&post_id));

    let (_, inbox) = node.get(&format!("/author/{}/inbox", outsider.id), Some(&outsider.token)).await;
    assert!(!item_ids(&inbox).contains(&post_id));

    let post_path = format!("/author/{}/posts/{}", owner.id, post_id);
    let (status, _) = node.get(&post_path, Some(&follower.token)).await;
    assert_eq!(status, 200);
    let (status, _) = node.get(&post_path, Some(&outsider.token)).await;
    assert_eq!(status, 401);

    // Someone else's inbox is off limits
    let (status, _) = node.get(&format!("/author/{}/inbox", follower.id), Some(&outsider.token)).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn stream_shows_public_own_and_friends_posts() {
    let node = TestNode::start().await;
    let viewer = node.signup("viewer").await;
    let friend = node.signup("friend").await;
    let other = node.signup("other").await;
    node.befriend(&viewer, &friend).await;

    let public = node.create_post(&other, json!({ "title": "p", "content": "x" })).await;
    let friends_only = node
        .create_post(&friend, json!({ "title": "f", "content": "x", "visibility": "FRIENDS" }))
        .await;
    let others_friends = node
        .create_post(&other, json!({ "title": "o", "content": "x", "visibility": "FRIENDS" }))
        .await;
    let own_private = node
        .create_post(&viewer, json!({ "title": "mine", "content": "x", "visibility": "PRIVATE" }))
        .await;
    let unlisted = node
        .create_post(&other, json!({ "title": "u", "content": "x", "unlisted": true }))
        .await;

    let (status, _) = node.get("/stream", None).await;
    assert_eq!(status, 401);

    let (status, stream) = node.get("/stream", Some(&viewer.token)).await;
    assert_eq!(status, 200);
    let ids = item_ids(&stream);
    assert!(ids.contains(&public["id"].as_str().unwrap().to_string()));
    assert!(ids.contains(&friends_only["id"].as_str().unwrap().to_string()));
    assert!(ids.contains(&own_private["id"].as_str().unwrap().to_string()));
    assert!(!ids.contains(&others_friends["id"].as_str().unwrap().to_string()));
    assert!(!ids.contains(&unlisted["id"].as_str().unwrap().to_string()));

    // Newest first, no duplicates
    assert_eq!(ids.first(), Some(&own_private["id"].as_str().unwrap().to_string()));
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), ids.len());
}

#[tokio::test]
async fn sharing_copies_visible_posts_only() {
    let node = TestNode::start().await;
    let owner = node.signup("owner").await;
    let sharer = node.signup("sharer").await;

    let post = node.create_post(&owner, json!({ "title": "Original", "content": "x" })).await;
    let (status, shared) = node
        .post(
            &format!("/author/{}/posts/{}/share", owner.id, post["id"].as_str().unwrap()),
            Some(&sharer.token),
            json!({}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(shared["author"]["id"], sharer.id);
    assert_eq!(shared["title"], format!("Original---Shared from {}", owner.username));
    assert!(shared["origin"].as_str().unwrap().ends_with(post["url"].as_str().unwrap()));

    let private = node
        .create_post(&owner, json!({ "title": "Mine", "content": "x", "visibility": "PRIVATE" }))
        .await;
    let private_share = format!("/author/{}/posts/{}/share", owner.id, private["id"].as_str().unwrap());
    let (status, _) = node.post(&private_share, Some(&sharer.token), json!({})).await;
    assert_eq!(status, 401);
    let (status, _) = node.post(&private_share, Some(&owner.token), json!({})).await;
    assert_eq!(status, 400);
}
