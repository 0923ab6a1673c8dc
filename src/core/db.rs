use tracing::info;
use uuid::Uuid;

use crate::authors::{insert_author, save_author};
use crate::config::{username_key, Config};
use crate::core::errors::ApiError;
use crate::core::helpers::now;
use crate::core::store::Store;
use crate::models::{ContentType, Post, PostAuthor, Visibility};
use crate::posts::insert_post;

struct DemoAuthor {
    username: &'static str,
    bio: &'static str,
    posts: &'static [(&'static str, &'static str)],
}

const DEMO_AUTHORS: &[DemoAuthor] = &[
    DemoAuthor {
        username: "test",
        bio: "Test user bio",
        posts: &[("Hello", "This is my first post on this node!")],
    },
    DemoAuthor {
        username: "alice",
        bio: "Hello, I'm Alice!",
        posts: &[
            ("Welcome", "Welcome to my page! Excited to share thoughts here."),
            ("Done", "Just finished an amazing project. Feeling productive today!"),
        ],
    },
    DemoAuthor {
        username: "bob",
        bio: "Bob's corner of the internet",
        posts: &[("Hi all", "Hey everyone! Just joined, looking forward to connecting with you all.")],
    },
];

/// Creates the demo authors with their posts and makes `test` follow
/// `bob`. Authors that already exist are left alone.
pub fn seed_demo_data(store: &Store, config: &Config) -> anyhow::Result<()> {
    let created = store.transaction::<_, ApiError>(|tx| {
        let mut created = 0;
        for demo in DEMO_AUTHORS {
            if tx.exists(&username_key(demo.username)) {
                continue;
            }

            // Demo passwords equal the username
            let mut author = insert_author(tx, demo.username, demo.username, &config.host)?;
            author.bio = demo.bio.to_string();
            save_author(tx, &author)?;

            for (title, content) in demo.posts {
                let post = Post {
                    id: Uuid::new_v4(),
                    title: title.to_string(),
                    source: String::new(),
                    origin: String::new(),
                    description: String::new(),
                    content_type: ContentType::Plain,
                    content: content.to_string(),
                    author: PostAuthor::Local { id: author.id },
                    categories: Vec::new(),
                    published: now(),
                    updated_at: None,
                    visibility: Visibility::Public,
                    unlisted: false,
                    to_author: None,
                    remote_id: None,
                };
                insert_post(tx, &post)?;
            }
            created += 1;
        }

        let test: Option<Uuid> = tx.get_json(&username_key("test"))?;
        let bob: Option<Uuid> = tx.get_json(&username_key("bob"))?;
        if let (Some(test), Some(bob)) = (test, bob) {
            crate::follow::follow_author(tx, test, bob)?;
        }
        Ok(created)
    });

    match created {
        Ok(0) => Ok(()),
        Ok(n) => {
            info!("Seeded {n} demo authors");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("failed to seed demo data: {e}")),
    }
}
