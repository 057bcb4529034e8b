use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use databricks_mcp::{
    api::http::{axum::Mcp, mcp::McpServer},
    config::{Backend, Config},
    core::{Core, QueryBackend, ToolDescriptor},
    databricks::{
        self, auth::token_minter::TokenMinter, genie::GenieRoom, serving::ServingEndpoint,
        Workspace,
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let reqwest_client = databricks::http_client().context("building HTTP client")?;

    let token_minter = TokenMinter::from_credentials(
        reqwest_client.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
        config.host.clone(),
    )
    .await
    .context("minting the initial OAuth token")?;

    let workspace = Workspace {
        client: reqwest_client,
        host: config.host.clone(),
        auth_token_provider: token_minter,
    };

    let (server_name, tool, backend) = match config.backend {
        Backend::Genie { space_id } => (
            "genie-mcp-server",
            ToolDescriptor::genie(),
            Box::new(GenieRoom::new(workspace, space_id)) as Box<dyn QueryBackend>,
        ),
        Backend::AgentBricks { serving_endpoint } => (
            "mcp-server",
            ToolDescriptor::agent_bricks(),
            Box::new(ServingEndpoint {
                workspace,
                endpoint_name: serving_endpoint,
            }) as Box<dyn QueryBackend>,
        ),
    };

    let core = Arc::new(Core {
        server_name: server_name.to_owned(),
        tool,
        backend,
    });

    let app = Router::new();
    let app = Mcp::routes(app, McpServer::new(core));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!(message = "MCP server started", server = server_name, %addr);

    axum::serve(listener, app).await.context("serving HTTP")?;

    info!(message = "MCP server stopped", server = server_name);
    Ok(())
}
