use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use ticket_tree::api::{HasPool, TicketApp};

#[derive(Clone)]
struct DemoApp {
    pool: Arc<PgPool>,
}

impl HasPool for DemoApp {
    fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

impl TicketApp for DemoApp {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ticket_tree=debug")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .context("DATABASE_URL is required to run demos/ticket_api_server.rs")?;
    let bind = env::var("TICKET_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid TICKET_BIND '{}'", bind))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    ticket_tree::db::create_ticket_tables(&pool)
        .await
        .context("failed to run ticket migrations")?;

    let app_state = DemoApp {
        pool: Arc::new(pool),
    };

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .merge(ticket_tree::api::routes::<DemoApp>());

    let app = Router::new().nest("/api/v1", api_v1).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!("ticket_tree demo server listening on http://{}", bind_addr);
    tracing::info!("api base path: /api/v1");

    axum::serve(listener, app)
        .await
        .context("demo server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}
