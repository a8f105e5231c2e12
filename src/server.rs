//! MCP tool server

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{DatabaseManager, Row};
use crate::error::Result;
use crate::formatter::format_results;

// ============================================================================
// Parameter Types
// ============================================================================

fn default_format() -> String {
    "json".to_string()
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(description = "SQL statement to execute")]
    pub query: String,
    #[serde(default = "default_format")]
    #[schemars(description = "Output format: json (default), csv or markdown")]
    pub format_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FormatParams {
    #[serde(default = "default_format")]
    #[schemars(description = "Output format: json (default), csv or markdown")]
    pub format_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesParams {
    #[serde(default)]
    #[schemars(description = "Optional database name to list tables from")]
    pub database: Option<String>,
    #[serde(default = "default_format")]
    #[schemars(description = "Output format: json (default), csv or markdown")]
    pub format_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    #[schemars(description = "Name of the table, optionally schema-qualified")]
    pub table_name: String,
    #[serde(default = "default_format")]
    #[schemars(description = "Output format: json (default), csv or markdown")]
    pub format_type: String,
}

// ============================================================================
// SQL MCP Server
// ============================================================================

/// SQL MCP Server
///
/// Exposes `execute_query`, `list_databases`, `list_tables` and
/// `describe_table` over a shared [`DatabaseManager`].
#[derive(Clone)]
pub struct SqlMcpServer {
    database: DatabaseManager,
    pub tool_router: ToolRouter<Self>,
}

impl SqlMcpServer {
    pub fn new(database: DatabaseManager) -> Self {
        Self {
            database,
            tool_router: Self::tool_router(),
        }
    }

    fn respond(rows: Result<Vec<Row>>, format_type: &str) -> Result<CallToolResult, McpError> {
        let text = format_results(&rows?, format_type).map_err(crate::Error::from)?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

// ============================================================================
// MCP Tools
// ============================================================================

#[rmcp::tool_router]
impl SqlMcpServer {
    #[rmcp::tool(description = "Execute a SQL query and return the resulting rows")]
    pub async fn execute_query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "execute_query", format = %params.format_type);
        let rows = self.database.execute_query(&params.query).await;
        if let Err(e) = &rows {
            tracing::debug!("execute_query failed: {}", e);
        }
        Self::respond(rows, &params.format_type)
    }

    #[rmcp::tool(description = "List the databases visible to the connection")]
    pub async fn list_databases(
        &self,
        Parameters(params): Parameters<FormatParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "list_databases", format = %params.format_type);
        let rows = self.database.list_databases().await;
        Self::respond(rows, &params.format_type)
    }

    #[rmcp::tool(description = "List tables, optionally limited to one database")]
    pub async fn list_tables(
        &self,
        Parameters(params): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "list_tables", database = ?params.database, format = %params.format_type);
        let rows = self.database.list_tables(params.database.as_deref()).await;
        Self::respond(rows, &params.format_type)
    }

    #[rmcp::tool(description = "Describe the columns of a table")]
    pub async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "describe_table", table = %params.table_name, format = %params.format_type);
        let rows = self.database.describe_table(&params.table_name).await;
        Self::respond(rows, &params.format_type)
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[rmcp::tool_handler]
impl ServerHandler for SqlMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mode = if self.database.read_only() {
            "Read-only mode: execute_query accepts only row-returning statements."
        } else {
            "execute_query runs any SQL statement, including writes and DDL."
        };

        InitializeResult {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "sql-mcp-server".to_string(),
                title: Some("SQL MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "MCP server for SQL databases: run queries, list databases and tables, describe tables. \
                 Results are formatted as json (default), csv or markdown. {}",
                mode
            )),
        }
    }
}
