use std::collections::HashSet;

use serde_json::{Map, Value};

/// The single tool an MCP server exposes, and the backend answering it.
pub struct Core {
    pub server_name: String,
    pub tool: ToolDescriptor,
    pub backend: Box<dyn QueryBackend>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub query_description: String,
}

impl ToolDescriptor {
    pub fn genie() -> Self {
        Self {
            name: "genie-query".into(),
            description:
                "Query the genie room to get an answer to supply chain and distribution questions"
                    .into(),
            query_description: "Query to be answered by the genie room".into(),
        }
    }

    pub fn agent_bricks() -> Self {
        Self {
            name: "agent-bricks".into(),
            description: "agent bricks".into(),
            query_description: "Query to be answered by the agent-bricks".into(),
        }
    }
}

#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Answer `query`, continuing `conversation_id` when the backend keeps conversations.
    async fn ask(&self, query: &str, conversation_id: Option<&str>) -> Result<Reply, anyhow::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub answer: Answer,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        sql: Option<String>,
    },
}

impl Answer {
    /// Text handed back to the MCP client. Tables become a JSON array of records.
    pub fn render(&self) -> String {
        match self {
            Answer::Text(text) => text.clone(),
            Answer::Table { columns, rows, .. } => {
                let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(columns.len());
                let keys = record_keys(columns, width);
                let records = rows
                    .iter()
                    .map(|row| {
                        let record: Map<String, Value> = keys
                            .iter()
                            .enumerate()
                            .map(|(i, key)| {
                                (key.clone(), row.get(i).cloned().unwrap_or(Value::Null))
                            })
                            .collect();
                        Value::Object(record)
                    })
                    .collect();
                Value::Array(records).to_string()
            }
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Answer::Table { sql, .. } => sql.as_deref(),
            Answer::Text(_) => None,
        }
    }
}

/// One distinct key per cell position.
///
/// Positions past the schema are named `column_{i}`; a repeated name gets a `_1`, `_2`... suffix.
fn record_keys(columns: &[String], width: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(width);
    (0..width)
        .map(|i| {
            let base = columns
                .get(i)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i));
            let mut key = base.clone();
            let mut suffix = 1;
            while !seen.insert(key.clone()) {
                key = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn table_renders_as_records() {
        let answer = Answer::Table {
            columns: vec!["region".into(), "units".into()],
            rows: vec![vec![json!("EMEA"), json!("12")], vec![json!("APAC"), Value::Null]],
            sql: Some("SELECT region, units FROM t".into()),
        };

        let rendered: Value = serde_json::from_str(&answer.render()).unwrap();

        assert_eq!(
            rendered,
            json!([
                {"region": "EMEA", "units": "12"},
                {"region": "APAC", "units": null}
            ])
        );
        assert_eq!(answer.sql(), Some("SELECT region, units FROM t"));
    }

    #[test]
    fn duplicate_column_names_keep_every_cell() {
        let answer = Answer::Table {
            columns: vec!["id".into(), "id".into(), "id_1".into()],
            rows: vec![vec![json!("1"), json!("2"), json!("3")]],
            sql: None,
        };

        let rendered: Value = serde_json::from_str(&answer.render()).unwrap();

        assert_eq!(rendered, json!([{"id": "1", "id_1": "2", "id_1_1": "3"}]));
    }

    #[test]
    fn short_schema_is_filled_with_positional_names() {
        let answer = Answer::Table {
            columns: vec!["a".into()],
            rows: vec![vec![json!("1"), json!("2"), json!("3")], vec![json!("4")]],
            sql: None,
        };

        let rendered: Value = serde_json::from_str(&answer.render()).unwrap();

        assert_eq!(
            rendered,
            json!([
                {"a": "1", "column_1": "2", "column_2": "3"},
                {"a": "4", "column_1": null, "column_2": null}
            ])
        );
    }

    #[test]
    fn text_renders_verbatim() {
        let answer = Answer::Text("42 pallets".into());
        assert_eq!(answer.render(), "42 pallets");
        assert_eq!(answer.sql(), None);
    }
}
