//! MCP server exposing the configured backend as a single tool.

use std::sync::Arc;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
        ListToolsResult, LoggingLevel, LoggingMessageNotificationParam, PaginatedRequestParam,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::{Peer, RequestContext},
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::core::{Core, Reply};

/// Arguments of a validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub query: String,
    pub conversation_id: Option<String>,
}

#[derive(Clone)]
pub struct McpServer {
    core: Arc<Core>,
}

impl McpServer {
    pub fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    pub fn tool(&self) -> Tool {
        let tool = &self.core.tool;
        let schema = json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": tool.query_description,
                },
                "conversation_id": {
                    "type": "string",
                    "description": "Conversation to continue, as returned in a previous result",
                },
            },
        });
        let schema: JsonObject = match schema {
            Value::Object(schema) => schema,
            _ => JsonObject::new(),
        };
        Tool::new(tool.name.clone(), tool.description.clone(), Arc::new(schema))
    }

    /// Check the tool name and pull `query` and `conversation_id` out of the arguments.
    pub fn parse_call(&self, request: &CallToolRequestParam) -> Result<ToolCall, McpError> {
        if request.name != self.core.tool.name.as_str() {
            return Err(McpError::invalid_params(
                format!("unknown tool: {}", request.name),
                None,
            ));
        }

        let argument = |key: &str| {
            request
                .arguments
                .as_ref()
                .and_then(|arguments| arguments.get(key))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        let query = argument("query").ok_or_else(|| {
            McpError::invalid_params("'query' is required in arguments", None)
        })?;
        Ok(ToolCall {
            query,
            conversation_id: argument("conversation_id"),
        })
    }

    /// Run the call against the backend. Backend failures become an error result, not a protocol error.
    pub async fn answer(&self, call: &ToolCall) -> CallToolResult {
        match self
            .core
            .backend
            .ask(&call.query, call.conversation_id.as_deref())
            .await
        {
            Ok(reply) => success(reply),
            Err(err) => {
                error!(message = "Tool call failed", tool = %self.core.tool.name, error = %format!("{:#}", err));
                CallToolResult::error(vec![Content::text(format!(
                    "Sorry, an error occurred: {}",
                    err
                ))])
            }
        }
    }

    async fn notify(&self, peer: &Peer<RoleServer>, level: LoggingLevel, data: String) {
        let param = LoggingMessageNotificationParam {
            level,
            logger: Some(self.core.server_name.clone()),
            data: Value::String(data),
        };
        if let Err(err) = peer.notify_logging_message(param).await {
            debug!(message = "Could not forward log message to client", error = %err);
        }
    }
}

fn success(reply: Reply) -> CallToolResult {
    let text = reply.answer.render();
    let mut structured = json!({ "answer": text });
    if let Some(conversation_id) = reply.conversation_id {
        structured["conversation_id"] = Value::String(conversation_id);
    }
    if let Some(sql) = reply.answer.sql() {
        structured["sql"] = Value::String(sql.to_owned());
    }

    let mut result = CallToolResult::success(vec![Content::text(text)]);
    result.structured_content = Some(structured);
    result
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name = self.core.server_name.clone();
        server_info.version = env!("CARGO_PKG_VERSION").to_owned();

        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_logging()
                .enable_tools()
                .build(),
            server_info,
            instructions: Some(self.core.tool.description.clone()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(vec![self.tool()]))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.parse_call(&request)?;

        info!(message = "Fetching an answer", tool = %request.name, query = %call.query);
        self.notify(
            &context.peer,
            LoggingLevel::Info,
            format!("Fetching an answer for {}…", call.query),
        )
        .await;

        let result = self.answer(&call).await;

        if result.is_error == Some(true) {
            self.notify(
                &context.peer,
                LoggingLevel::Error,
                "Failed to fetch an answer".to_owned(),
            )
            .await;
        } else {
            info!(message = "Answer fetched successfully", tool = %request.name);
            self.notify(
                &context.peer,
                LoggingLevel::Info,
                "Answer fetched successfully!".to_owned(),
            )
            .await;
        }

        Ok(result)
    }
}
