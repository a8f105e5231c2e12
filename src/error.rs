//! Crate error types and their mapping onto MCP errors

use rmcp::ErrorData as McpError;

use crate::database::DatabaseError;
use crate::formatter::FormatError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("read-only mode: only row-returning statements are allowed")]
    ReadOnly,
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        match err {
            Error::Format(e) => McpError::invalid_params(e.to_string(), None),
            Error::ReadOnly => McpError::invalid_request(err.to_string(), None),
            other => McpError::internal_error(other.to_string(), None),
        }
    }
}
