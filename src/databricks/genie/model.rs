use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_ERROR: &str = "ERROR";
pub const STATUS_FAILED: &str = "FAILED";

pub fn is_terminal(status: &str) -> bool {
    matches!(status, STATUS_COMPLETED | STATUS_ERROR | STATUS_FAILED)
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct StartConversationResponse {
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub id: Option<String>,
    pub message_id: Option<String>,
    pub status: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref().or(self.id.as_deref())
    }
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub attachment_id: Option<String>,
    pub text: Option<TextAttachment>,
    pub query: Option<QueryAttachment>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct TextAttachment {
    pub content: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct QueryAttachment {
    /// Generated SQL.
    pub query: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResultResponse {
    pub statement_response: Option<StatementResponse>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct StatementResponse {
    pub result: Option<ResultData>,
    pub manifest: Option<Manifest>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub data_array: Vec<Vec<Value>>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    pub schema: Option<Schema>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub columns: Vec<Column>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    pub name: Option<String>,
}

/// Rows of a query result along with the column names from its manifest.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data_array: Vec<Vec<Value>>,
    pub columns: Vec<String>,
}

impl From<QueryResultResponse> for QueryResult {
    fn from(res: QueryResultResponse) -> Self {
        let statement = res.statement_response.unwrap_or_default();
        let data_array = statement.result.map(|r| r.data_array).unwrap_or_default();
        let columns = statement
            .manifest
            .and_then(|m| m.schema)
            .map(|s| s.columns)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.name.unwrap_or_default())
            .collect();
        Self {
            data_array,
            columns,
        }
    }
}
