//! Standalone SQL MCP server binary
//!
//! # Configuration
//!
//! Settings come from the environment, optionally seeded from a `.env` file
//! in the working directory:
//!
//! - `DATABASE_PROVIDER`, `DATABASE_HOST`, `DATABASE_PORT`, `DATABASE_USER`,
//!   `DATABASE_NAME`, `DATABASE_MIN_POOL_SIZE`, `DATABASE_MAX_POOL_SIZE`
//!   (required)
//! - `DATABASE_PASSWORD`, `DATABASE_READ_ONLY`, `HTTP_HOST`, `HTTP_PORT`,
//!   `MCP_TRANSPORT` (optional)
//!
//! # Example
//!
//! ```bash
//! export DATABASE_PROVIDER=postgres DATABASE_HOST=localhost DATABASE_PORT=5432 \
//!        DATABASE_USER=postgres DATABASE_NAME=mydb \
//!        DATABASE_MIN_POOL_SIZE=1 DATABASE_MAX_POOL_SIZE=5
//! sql-mcp-server
//! ```

use anyhow::{Context, Result};
use sql_mcp_server::{transport, DatabaseManager, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing on stderr so stdout stays free for the stdio transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sql_mcp_server=info,rmcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let settings = Settings::from_env().context("Invalid configuration")?;
    tracing::info!("Starting SQL MCP server");
    tracing::debug!(?settings, "Loaded settings");

    let database = DatabaseManager::connect(&settings)
        .await
        .context("Failed to connect to the database")?;

    transport::run(database, &settings, transport::shutdown_signal()).await
}
