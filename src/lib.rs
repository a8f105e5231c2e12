//! SQL MCP Server
//!
//! A Model Context Protocol (MCP) server for SQL databases, built with rmcp.
//! Exposes four tools (`execute_query`, `list_databases`, `list_tables` and
//! `describe_table`) whose results are rendered as JSON, CSV or Markdown.
//!
//! # Example
//!
//! ```no_run
//! use sql_mcp_server::{DatabaseManager, Settings, SqlMcpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let database = DatabaseManager::connect(&settings).await?;
//!     let server = SqlMcpServer::new(database);
//!     // Serve with rmcp's ServiceExt or the streamable HTTP service
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod formatter;
pub mod server;
pub mod transport;

pub use config::{ConfigError, Settings, Transport};
pub use database::{DatabaseClient, DatabaseError, DatabaseManager, Row};
pub use error::{Error, Result};
pub use formatter::{format_results, FormatError, FormatType};
pub use server::SqlMcpServer;
