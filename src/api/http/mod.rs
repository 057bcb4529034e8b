pub mod axum;
pub mod mcp;
