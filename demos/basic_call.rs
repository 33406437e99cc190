//! Basic outbound calls: GET with retries, POST with a JSON body, and a
//! cancellable request.
//!
//! Run with: `cargo run --example basic_call`

use serde::{Deserialize, Serialize};
use skein::{middleware, CancelToken, Client, Error};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("skein=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .timeout(Duration::from_secs(10))
        .middleware(middleware::trace())
        .build()?;

    println!("=== GET with retries ===");
    let reply = client
        .request()
        .retry(2, Duration::from_millis(200))
        .query("lang", "en")
        .send_json::<Post>("/posts/1")
        .await?;

    println!("Post ID: {}", reply.data.id);
    println!("Title: {}", reply.data.title);
    println!("Attempts: {}", reply.attempts);
    println!("Latency: {:?}", reply.latency);
    println!();

    println!("=== POST a JSON body ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let mut response = client.request().json(&new_post).post("/posts").await?;
    println!("Status: {}", response.status());
    println!("Content-Type: {:?}", response.header("content-type"));
    let created: Post = response.json().await?;
    println!("Created post ID: {}", created.id);
    println!();

    println!("=== Cancelled request ===");
    let token = CancelToken::new();
    token.cancel();
    match client.request().cancel_token(token).get("/posts/2").await {
        Err(Error::Cancelled) => println!("Request was cancelled before it was sent"),
        other => println!("Unexpected outcome: {:?}", other.map(|r| r.status())),
    }

    Ok(())
}
