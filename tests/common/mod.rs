#![allow(dead_code)]

use std::net::TcpListener;

use actix_web::{web, App, HttpServer};
use distsoc::config::Config;
use distsoc::handlers::handle_all;
use distsoc::state::AppState;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

/// A node served on an ephemeral local port.
pub struct TestNode {
    pub base: String,
    pub client: reqwest::Client,
    pub state: web::Data<AppState>,
}

pub struct TestAuthor {
    pub id: String,
    pub username: String,
    pub token: String,
}

impl TestNode {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let base = format!("http://{}", listener.local_addr().unwrap());

        let mut config = Config::local(&base);
        configure(&mut config);
        let state = web::Data::new(AppState::new(config).expect("failed to build state"));

        let app_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(app_state.clone())
                .default_service(web::route().to(handle_all))
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .run();
        tokio::spawn(server);

        Self {
            base,
            client: reqwest::Client::new(),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.expect("Failed to make request");
        let status = response.status();
        let text = response.text().await.unwrap();
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, token, Some(body)).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, path, token, None).await
    }

    /// Signs up a fresh author and logs them in.
    pub async fn signup(&self, prefix: &str) -> TestAuthor {
        let username = format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8]);

        let (status, author) = self
            .post("/signup", None, json!({ "username": username, "password": "test" }))
            .await;
        assert_eq!(status, 201, "signup failed: {:?}", author);
        let id = author["id"].as_str().unwrap().to_string();

        let (status, login) = self
            .post("/login", None, json!({ "username": username, "password": "test" }))
            .await;
        assert_eq!(status, 200, "login failed: {:?}", login);
        let token = login["token"].as_str().unwrap().to_string();

        TestAuthor { id, username, token }
    }

    pub async fn create_post(&self, author: &TestAuthor, body: Value) -> Value {
        let (status, post) = self
            .post(&format!("/author/{}/posts", author.id), Some(&author.token), body)
            .await;
        assert_eq!(status, 201, "post creation failed: {:?}", post);
        post
    }

    /// `a` follows `b`, then declares the friendship.
    pub async fn befriend(&self, a: &TestAuthor, b: &TestAuthor) {
        let (status, _) = self
            .put(&format!("/author/{}/followers/{}", b.id, a.id), Some(&a.token), json!({}))
            .await;
        assert_eq!(status, 200);
        let (status, _) = self
            .put(&format!("/author/{}/friends/{}", a.id, b.id), Some(&a.token), json!({}))
            .await;
        assert_eq!(status, 200);
    }

    pub fn author_url(&self, author: &TestAuthor) -> String {
        format!("{}/author/{}", self.base, author.id)
    }
}

pub fn item_ids(list: &Value) -> Vec<String> {
    list["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
