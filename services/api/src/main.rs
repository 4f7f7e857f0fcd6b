//! API Service - Upload and review of accounting spreadsheets
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /upload - Ingest a CSV/workbook (multipart field `file`)
//! - GET /workspaces/:id - Live view of an upload
//! - DELETE /workspaces/:id - Close a workspace
//! - PATCH /workspaces/:id/cells - Edit one cell
//! - DELETE /workspaces/:id/sheets/:sheet/rows/:row - Delete one row
//! - POST /workspaces/:id/save - Persist the workspace
//! - GET /workspaces/:id/sheets/:sheet/rows/:row/case - Case detail of one row
//! - GET, DELETE /files/:id - Stored files
//! - GET /template.csv, /template.xlsx - Import template

mod config;
mod error;
mod routes;
mod store;
mod workspace;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::routes::AppState;
use crate::store::{FileStore, MemoryFileStore, PgFileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    println!("=== Case Ingest API ===");

    let store: Arc<dyn FileStore> = match &config.db_url {
        Some(db_url) => {
            println!("Connecting to database...");
            let store = PgFileStore::connect(db_url)
                .await
                .context("Failed to connect to database")?;
            println!("Database connected");
            Arc::new(store)
        }
        None => {
            println!("DB_URL not set - files are kept in memory only");
            Arc::new(MemoryFileStore::default())
        }
    };

    let state = Arc::new(AppState::new(store));
    let app = routes::router(state, config.max_upload_bytes);

    println!("API listening on http://{}", config.bind);
    println!("\nEndpoints:");
    println!("  GET    /health");
    println!("  POST   /upload (multipart field 'file', max {} bytes)", config.max_upload_bytes);
    println!("  GET    /workspaces/:id");
    println!("  DELETE /workspaces/:id");
    println!("  PATCH  /workspaces/:id/cells");
    println!("  DELETE /workspaces/:id/sheets/:sheet/rows/:row");
    println!("  POST   /workspaces/:id/save");
    println!("  GET    /workspaces/:id/sheets/:sheet/rows/:row/case");
    println!("  GET    /files/:id");
    println!("  DELETE /files/:id");
    println!("  GET    /template.csv");
    println!("  GET    /template.xlsx");

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
