//! Process configuration read from the environment.

use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("env var {0} is not set")]
    Missing(&'static str),
    #[error("env var {key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Genie { space_id: String },
    AgentBricks { serving_endpoint: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub client_id: String,
    pub client_secret: String,
    pub backend: Backend,
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("backend", &self.backend)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|value| !value.is_empty());
        let require = |key: &'static str| get(key).ok_or(Error::Missing(key));

        let backend = match get("MCP_BACKEND").as_deref() {
            None | Some("genie") => Backend::Genie {
                space_id: require("SPACE_ID")?,
            },
            Some("agent-bricks") => Backend::AgentBricks {
                serving_endpoint: require("SERVING_ENDPOINT")?,
            },
            Some(other) => {
                return Err(Error::Invalid {
                    key: "MCP_BACKEND",
                    value: other.to_owned(),
                })
            }
        };

        let port = match get("DATABRICKS_APP_PORT") {
            None => DEFAULT_PORT,
            Some(value) => u16::from_str(&value).map_err(|_| Error::Invalid {
                key: "DATABRICKS_APP_PORT",
                value,
            })?,
        };

        Ok(Self {
            host: require("DATABRICKS_HOST")?,
            client_id: require("DATABRICKS_CLIENT_ID")?,
            client_secret: require("DATABRICKS_CLIENT_SECRET")?,
            backend,
            port,
        })
    }
}
