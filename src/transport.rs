//! Serving the MCP server over streamable HTTP or stdio

use std::future::Future;

use anyhow::{Context, Result};
use rmcp::service::ServiceExt;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{Settings, Transport};
use crate::database::DatabaseManager;
use crate::server::SqlMcpServer;

/// Path the streamable HTTP endpoint is mounted on
pub const MCP_PATH: &str = "/mcp";

/// Serve the tools backed by `database` until `shutdown` resolves, then
/// disconnect. The database is disconnected whether or not serving failed.
pub async fn run<F>(database: DatabaseManager, settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = SqlMcpServer::new(database.clone());
    let served = serve(server, settings, shutdown).await;
    if let Err(e) = &served {
        tracing::error!("Server stopped with an error: {:#}", e);
    }

    database.disconnect().await;
    served
}

/// Serve `server` on the transport chosen in `settings` until `shutdown`
/// resolves or the transport closes.
pub async fn serve<F>(server: SqlMcpServer, settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    match settings.transport {
        Transport::Http => serve_http(server, settings, shutdown).await,
        Transport::Stdio => serve_stdio(server, shutdown).await,
    }
}

async fn serve_http<F>(server: SqlMcpServer, settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let host = settings.listen_host();
    let port = settings.listen_port()?;

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    tracing::info!("Serving MCP over streamable HTTP at http://{}:{}{}", host, port, MCP_PATH);

    serve_http_on(listener, server, shutdown).await
}

/// Serve streamable HTTP on an already bound listener.
///
/// Open SSE streams are cancelled when `shutdown` resolves; otherwise the
/// graceful shutdown would wait on them forever.
pub async fn serve_http_on<F>(listener: TcpListener, server: SqlMcpServer, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            cancellation_token: cancel.clone(),
            ..Default::default()
        },
    );
    let router = axum::Router::new().nest_service(MCP_PATH, service);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            cancel.cancel();
        })
        .await
        .context("HTTP server failed")
}

async fn serve_stdio<F>(server: SqlMcpServer, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Serving MCP over stdio");

    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());
    let running = server
        .serve((stdin, stdout))
        .await
        .context("Failed to serve MCP server over stdio")?;

    tokio::select! {
        result = running.waiting() => {
            let reason = result.context("MCP stdio service panicked")?;
            tracing::info!(?reason, "Client disconnected");
        }
        _ = shutdown => {}
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Received shutdown signal, shutting down...");
}
