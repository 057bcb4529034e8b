//! Authorization logic.

pub mod client_credentials;
pub mod clock;
pub mod token_minter;

/// Error surfaced by a [`token_minter::TokenMinter`] backed by the workspace OIDC endpoint.
pub type AuthError = token_minter::Error<client_credentials::Error>;

#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    type Token: Token;
    type Error: Send + Sync;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error>;
}

pub trait Token: Send {
    fn access_token(&self) -> &str;
}
