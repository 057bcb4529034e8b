use axum::Router;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};

use super::mcp::McpServer;

pub const MCP_PATH: &str = "/api/mcp";

pub struct Mcp;

impl Mcp {
    /// Mount the streamable HTTP transport. Stateless: each POST is served on its own.
    pub fn routes(router: Router, server: McpServer) -> Router {
        let config = StreamableHttpServerConfig {
            stateful_mode: false,
            ..Default::default()
        };
        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            config,
        );
        router.nest_service(MCP_PATH, service)
    }
}
