//! Genie room client.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{Answer, Reply};

use super::{auth, Error, Workspace};

pub mod model;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const NO_RESPONSE: &str = "No response available";

pub struct GenieRoom<AuthTokenProvider> {
    pub workspace: Workspace<AuthTokenProvider>,
    pub space_id: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl<AuthTokenProvider> GenieRoom<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
{
    pub fn new(workspace: Workspace<AuthTokenProvider>, space_id: String) -> Self {
        Self {
            workspace,
            space_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn space_path(&self, rest: &str) -> String {
        format!("/api/2.0/genie/spaces/{}{}", self.space_id, rest)
    }

    fn message_path(&self, conversation_id: &str, message_id: &str) -> String {
        self.space_path(&format!(
            "/conversations/{}/messages/{}",
            conversation_id, message_id
        ))
    }

    /// Start a new conversation with the given question.
    pub async fn start_conversation(
        &self,
        question: &str,
    ) -> Result<model::StartConversationResponse, Error<AuthTokenProvider::Error>> {
        let path = self.space_path("/start-conversation");
        let body = model::MessageRequest { content: question };
        self.workspace.post(&path, &body).await
    }

    /// Send a follow-up message to an existing conversation.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<model::Message, Error<AuthTokenProvider::Error>> {
        let path = self.space_path(&format!("/conversations/{}/messages", conversation_id));
        let body = model::MessageRequest { content: message };
        self.workspace.post(&path, &body).await
    }

    pub async fn get_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<model::Message, Error<AuthTokenProvider::Error>> {
        let path = self.message_path(conversation_id, message_id);
        self.workspace.get(&path).await
    }

    pub async fn get_query_result(
        &self,
        conversation_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<model::QueryResult, Error<AuthTokenProvider::Error>> {
        let path = format!(
            "{}/attachments/{}/query-result",
            self.message_path(conversation_id, message_id),
            attachment_id
        );
        let res: model::QueryResultResponse = self.workspace.get(&path).await?;
        Ok(res.into())
    }

    /// Poll a message until it reaches `COMPLETED`, `ERROR` or `FAILED`.
    pub async fn wait_for_message_completion(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<model::Message, Error<AuthTokenProvider::Error>> {
        let started = Instant::now();
        let mut attempt = 1u32;

        while started.elapsed() < self.timeout {
            let message = self.get_message(conversation_id, message_id).await?;
            let status = message.status.as_deref().unwrap_or_default();
            if model::is_terminal(status) {
                return Ok(message);
            }
            debug!(message = "Genie message still running", status, attempt, message_id);

            tokio::time::sleep(self.poll_interval).await;
            attempt += 1;
        }

        Err(Error::Timeout(self.timeout))
    }

    /// Turn a finished message into an answer.
    ///
    /// The first text attachment wins; a query attachment wins once its result has rows.
    pub async fn process_response(
        &self,
        conversation_id: &str,
        message_id: &str,
        message: &model::Message,
    ) -> Result<Answer, Error<AuthTokenProvider::Error>> {
        for attachment in &message.attachments {
            if let Some(content) = attachment.text.as_ref().and_then(|t| t.content.as_ref()) {
                return Ok(Answer::Text(content.clone()));
            }

            let query = match &attachment.query {
                Some(query) => query,
                None => continue,
            };
            let attachment_id = attachment
                .attachment_id
                .as_deref()
                .ok_or(Error::MissingField("attachment_id"))?;

            let result = self
                .get_query_result(conversation_id, message_id, attachment_id)
                .await?;
            if result.data_array.is_empty() {
                continue;
            }

            let mut columns = result.columns;
            if columns.is_empty() {
                let width = result.data_array[0].len();
                columns = (0..width).map(|i| format!("column_{}", i)).collect();
            }
            return Ok(Answer::Table {
                columns,
                rows: result.data_array,
                sql: Some(query.query.clone().unwrap_or_default()),
            });
        }

        let text = message.content.clone().unwrap_or_else(|| NO_RESPONSE.to_owned());
        Ok(Answer::Text(text))
    }

    /// Ask a question, in a new conversation or as a follow-up in an existing one.
    pub async fn ask(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<Reply, Error<AuthTokenProvider::Error>> {
        let (conversation_id, message_id) = match conversation_id {
            None => {
                let res = self.start_conversation(question).await?;
                let conversation_id = res
                    .conversation_id
                    .ok_or(Error::MissingField("conversation_id"))?;
                let message_id = res.message_id.ok_or(Error::MissingField("message_id"))?;
                info!(message = "Started Genie conversation", conversation_id = %conversation_id);
                (conversation_id, message_id)
            }
            Some(conversation_id) => {
                info!(message = "Continuing Genie conversation", conversation_id);
                let res = self
                    .send_message(conversation_id, question)
                    .await
                    .map_err(|err| match err.status_code() {
                        Some(404) => Error::ConversationNotFound(conversation_id.to_owned()),
                        _ => err,
                    })?;
                let message_id = res
                    .message_id()
                    .ok_or(Error::MissingField("message_id"))?
                    .to_owned();
                (conversation_id.to_owned(), message_id)
            }
        };

        let message = self
            .wait_for_message_completion(&conversation_id, &message_id)
            .await?;
        let answer = self
            .process_response(&conversation_id, &message_id, &message)
            .await?;

        Ok(Reply {
            answer,
            conversation_id: Some(conversation_id),
        })
    }
}

#[async_trait::async_trait]
impl<AuthTokenProvider> crate::core::QueryBackend for GenieRoom<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
    <AuthTokenProvider as auth::TokenProvider>::Error: std::error::Error + 'static,
{
    async fn ask(&self, query: &str, conversation_id: Option<&str>) -> Result<Reply, anyhow::Error> {
        match GenieRoom::ask(self, query, conversation_id).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                warn!(message = "Genie query failed", error = %err);
                Err(describe_failure(err))
            }
        }
    }
}

fn describe_failure<E>(err: Error<E>) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let Error::ConversationNotFound(_) = err {
        return anyhow::anyhow!(
            "The previous conversation has expired. Please try your query again to start a new conversation."
        );
    }
    match err.status_code() {
        Some(429) => anyhow::anyhow!(
            "The system is currently experiencing high demand. Please try again in a few moments."
        ),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::databricks::test_support::{self, StaticToken};

    const SPACE: &str = "/api/2.0/genie/spaces/space-1";

    fn room(host: String) -> GenieRoom<StaticToken> {
        let mut room = GenieRoom::new(test_support::workspace(host), "space-1".into());
        room.poll_interval = Duration::from_millis(10);
        room
    }

    #[tokio::test]
    async fn new_conversation_with_text_attachment() {
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", format!("{}/start-conversation", SPACE).as_str())
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(json!({"content": "how many pallets?"})))
            .with_status(200)
            .with_body(r#"{"conversation_id": "c-1", "message_id": "m-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", format!("{}/conversations/c-1/messages/m-1", SPACE).as_str())
            .with_status(200)
            .with_body(
                r#"{"status": "COMPLETED", "content": "how many pallets?",
                    "attachments": [{"attachment_id": "a-1", "text": {"content": "42 pallets"}}]}"#,
            )
            .create_async()
            .await;

        let reply = room(server.url()).ask("how many pallets?", None).await.unwrap();

        assert_eq!(reply.answer, Answer::Text("42 pallets".into()));
        assert_eq!(reply.conversation_id.as_deref(), Some("c-1"));
        start.assert_async().await;
    }

    #[tokio::test]
    async fn query_attachment_becomes_table() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{}/start-conversation", SPACE).as_str())
            .with_status(200)
            .with_body(r#"{"conversation_id": "c-1", "message_id": "m-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", format!("{}/conversations/c-1/messages/m-1", SPACE).as_str())
            .with_status(200)
            .with_body(
                r#"{"status": "COMPLETED",
                    "attachments": [{"attachment_id": "a-1", "query": {"query": "SELECT 1 AS n"}}]}"#,
            )
            .create_async()
            .await;
        server
            .mock(
                "GET",
                format!("{}/conversations/c-1/messages/m-1/attachments/a-1/query-result", SPACE)
                    .as_str(),
            )
            .with_status(200)
            .with_body(r#"{"statement_response": {"result": {"data_array": [["1", "x"]]}}}"#)
            .create_async()
            .await;

        let reply = room(server.url()).ask("one?", None).await.unwrap();

        assert_eq!(
            reply.answer,
            Answer::Table {
                columns: vec!["column_0".into(), "column_1".into()],
                rows: vec![vec![json!("1"), json!("x")]],
                sql: Some("SELECT 1 AS n".into()),
            }
        );
    }

    #[tokio::test]
    async fn empty_query_result_falls_back_to_message_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", format!("{}/conversations/c-1/messages/m-1", SPACE).as_str())
            .with_status(200)
            .with_body(
                r#"{"status": "COMPLETED", "content": "nothing found",
                    "attachments": [{"attachment_id": "a-1", "query": {"query": "SELECT 1"}}]}"#,
            )
            .create_async()
            .await;
        server
            .mock(
                "GET",
                format!("{}/conversations/c-1/messages/m-1/attachments/a-1/query-result", SPACE)
                    .as_str(),
            )
            .with_status(200)
            .with_body(r#"{"statement_response": {"result": {"data_array": []}}}"#)
            .create_async()
            .await;
        let room = room(server.url());

        let message = room.wait_for_message_completion("c-1", "m-1").await.unwrap();
        let answer = room.process_response("c-1", "m-1", &message).await.unwrap();

        assert_eq!(answer, Answer::Text("nothing found".into()));
    }

    #[tokio::test]
    async fn message_without_attachments_or_content() {
        let room = room("http://127.0.0.1:9".into());
        let message = model::Message {
            status: Some("COMPLETED".into()),
            ..model::Message::default()
        };

        let answer = room.process_response("c-1", "m-1", &message).await.unwrap();

        assert_eq!(answer, Answer::Text(NO_RESPONSE.into()));
    }

    #[tokio::test]
    async fn follow_up_uses_existing_conversation() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", format!("{}/conversations/c-9/messages", SPACE).as_str())
            .match_body(Matcher::Json(json!({"content": "and last week?"})))
            .with_status(200)
            .with_body(r#"{"id": "m-2", "status": "SUBMITTED"}"#)
            .create_async()
            .await;
        server
            .mock("GET", format!("{}/conversations/c-9/messages/m-2", SPACE).as_str())
            .with_status(200)
            .with_body(r#"{"status": "COMPLETED", "content": "17"}"#)
            .create_async()
            .await;

        let reply = room(server.url()).ask("and last week?", Some("c-9")).await.unwrap();

        assert_eq!(reply.answer, Answer::Text("17".into()));
        assert_eq!(reply.conversation_id.as_deref(), Some("c-9"));
        send.assert_async().await;
    }

    #[tokio::test]
    async fn polling_gives_up_after_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", format!("{}/conversations/c-1/messages/m-1", SPACE).as_str())
            .with_status(200)
            .with_body(r#"{"status": "EXECUTING_QUERY"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let mut room = room(server.url());
        room.timeout = Duration::from_millis(50);

        let err = room.wait_for_message_completion("c-1", "m-1").await.unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn rate_limit_is_reported_as_high_demand() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{}/start-conversation", SPACE).as_str())
            .with_status(429)
            .create_async()
            .await;
        let room = room(server.url());

        let err = crate::core::QueryBackend::ask(&room, "q", None).await.unwrap_err();

        assert!(err.to_string().contains("high demand"));
    }

    #[tokio::test]
    async fn missing_conversation_is_reported_as_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{}/conversations/gone/messages", SPACE).as_str())
            .with_status(404)
            .with_body(r#"{"error_code": "NOT_FOUND", "message": "Conversation not found"}"#)
            .create_async()
            .await;
        let room = room(server.url());

        let err = crate::core::QueryBackend::ask(&room, "q", Some("gone"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn missing_message_in_live_conversation_is_not_expiry() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{}/conversations/c-1/messages", SPACE).as_str())
            .with_status(200)
            .with_body(r#"{"message_id": "m-7", "status": "SUBMITTED"}"#)
            .create_async()
            .await;
        server
            .mock("GET", format!("{}/conversations/c-1/messages/m-7", SPACE).as_str())
            .with_status(404)
            .create_async()
            .await;
        let room = room(server.url());

        let err = crate::core::QueryBackend::ask(&room, "q", Some("c-1"))
            .await
            .unwrap_err();

        assert!(!err.to_string().contains("expired"));
        assert!(err.to_string().contains("404"));
    }
}
