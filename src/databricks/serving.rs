//! Agent Bricks model serving endpoint client.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{Answer, Reply};

use super::{auth, Error, Workspace};

pub struct ServingEndpoint<AuthTokenProvider> {
    pub workspace: Workspace<AuthTokenProvider>,
    pub endpoint_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct InvocationRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Both agent-style (`messages`) and chat-completion-style (`choices`) outputs.
#[derive(Default, Debug, Clone, Deserialize)]
struct InvocationResponse {
    #[serde(default)]
    messages: Vec<OutputMessage>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Default, Debug, Clone, Deserialize)]
struct OutputMessage {
    content: Option<serde_json::Value>,
}

#[derive(Default, Debug, Clone, Deserialize)]
struct Choice {
    message: Option<OutputMessage>,
}

impl OutputMessage {
    fn text(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|content| content.as_str())
            .filter(|text| !text.is_empty())
    }
}

impl InvocationResponse {
    fn into_text(self) -> String {
        if !self.messages.is_empty() {
            return self.messages.iter().filter_map(OutputMessage::text).collect();
        }
        self.choices
            .iter()
            .filter_map(|choice| choice.message.as_ref().and_then(OutputMessage::text))
            .collect()
    }
}

impl<AuthTokenProvider> ServingEndpoint<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
{
    fn invocations_path(&self) -> String {
        format!("/serving-endpoints/{}/invocations", self.endpoint_name)
    }

    /// Send `query` as a single user message and concatenate the textual output.
    pub async fn query(&self, query: &str) -> Result<String, Error<AuthTokenProvider::Error>> {
        let body = InvocationRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: query,
            }],
        };
        let res: InvocationResponse = self
            .workspace
            .post(&self.invocations_path(), &body)
            .await?;
        info!(message = "Serving endpoint answered", endpoint = %self.endpoint_name);
        Ok(res.into_text())
    }
}

#[async_trait::async_trait]
impl<AuthTokenProvider> crate::core::QueryBackend for ServingEndpoint<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
    <AuthTokenProvider as auth::TokenProvider>::Error: std::error::Error + 'static,
{
    async fn ask(&self, query: &str, _conversation_id: Option<&str>) -> Result<Reply, anyhow::Error> {
        let text = self.query(query).await.map_err(|err| {
            warn!(message = "Serving endpoint query failed", error = %err);
            err
        })?;
        Ok(Reply {
            answer: Answer::Text(text),
            conversation_id: None,
        })
    }
}
