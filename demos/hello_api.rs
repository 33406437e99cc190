//! A typed handler served over HTTP.
//!
//! Run with: `cargo run --example hello_api`, then
//! `curl 'http://127.0.0.1:3000/api/v1/hello?name=world'`.

use serde::{Deserialize, Serialize};
use skein::server::{Api, AppError, Context, Validate, ValidationErrors};

#[derive(Debug, Deserialize)]
struct HelloReq {
    name: String,
}

impl Validate for HelloReq {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "name is required");
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
struct HelloRes {
    greeting: String,
}

async fn hello(ctx: Context, req: HelloReq) -> Result<HelloRes, AppError> {
    tracing::info!(user_agent = ?ctx.header("user-agent"), "Greeting {}", req.name);
    Ok(HelloRes {
        greeting: format!("hello, {}", req.name),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("skein=debug,hello_api=info")
        .init();

    let api = Api::new().register(http::Method::GET, "/api/v1/hello", "Say hello", hello)?;
    for route in api.routes() {
        println!("{} {} - {}", route.method, route.path, route.summary);
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, api.into_router()).await?;
    Ok(())
}
