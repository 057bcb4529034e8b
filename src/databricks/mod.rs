//! Databricks workspace clients.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;

use self::{
    auth::Token,
    utils::{check_status, workspace_url, ServerError},
};

pub mod auth;
pub mod genie;
pub mod serving;
mod utils;

/// Per-request timeout for workspace API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client shared by the token minter and the workspace clients.
///
/// Wire-level logging stays off: request bytes carry client secrets and bearer tokens.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[derive(Debug, thiserror::Error)]
pub enum Error<AuthError> {
    #[error("auth: {0}")]
    Auth(#[source] AuthError),
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("server: {0}")]
    Server(#[from] ServerError),
    #[error("message processing timed out after {0:?}")]
    Timeout(Duration),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
    #[error("conversation {0} not found")]
    ConversationNotFound(String),
}

impl<AuthError> Error<AuthError> {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Server(ServerError { status_code }) => Some(*status_code),
            Error::Reqwest(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// Authenticated access to one workspace's REST API.
///
/// A token is requested from the provider for every call and never kept here.
pub struct Workspace<AuthTokenProvider> {
    pub client: reqwest::Client,
    pub host: String,
    pub auth_token_provider: AuthTokenProvider,
}

impl<AuthTokenProvider> Workspace<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
{
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", workspace_url(&self.host), path)
    }

    async fn get_auth_token(&self) -> Result<String, Error<AuthTokenProvider::Error>> {
        let token = self
            .auth_token_provider
            .get_auth_token()
            .await
            .map_err(Error::Auth)?;
        Ok(token.access_token().to_owned())
    }

    async fn build_request<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Request, Error<AuthTokenProvider::Error>>
    where
        B: Serialize + ?Sized,
    {
        let auth_token = self.get_auth_token().await?;
        let builder = self
            .client
            .request(method.clone(), url)
            .bearer_auth(auth_token)
            .timeout(REQUEST_TIMEOUT);

        let builder = match body {
            Some(body) => builder.json(body),
            None if method == Method::POST => builder.header(reqwest::header::CONTENT_LENGTH, 0),
            None => builder,
        };

        builder.build().map_err(Error::Reqwest)
    }

    async fn exec(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, Error<AuthTokenProvider::Error>> {
        let res = self.client.execute(request).await.map_err(Error::Reqwest)?;
        check_status(&res)?;
        Ok(res)
    }

    async fn parse_json<T>(res: reqwest::Response) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        res.json().await.map_err(Error::Reqwest)
    }

    pub async fn get<T>(&self, path: &str) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.url(path);
        let request = self.build_request::<()>(Method::GET, &url, None).await?;
        let res = self.exec(request).await?;
        Self::parse_json(res).await
    }

    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        B: Serialize + ?Sized,
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.url(path);
        let request = self.build_request(Method::POST, &url, Some(body)).await?;
        let res = self.exec(request).await?;
        Self::parse_json(res).await
    }
}
