use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{
    client_credentials::ClientCredentials,
    clock::{Clock, SystemClock},
    TokenProvider,
};

/// How long a freshly minted token is trusted. The workspace issues 60 minute tokens.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);

/// A cached token this close to its expiry is refreshed before being handed out.
pub const REFRESH_BEFORE_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Hands out OAuth access tokens, minting a new one whenever the cached one
/// is missing or within [`REFRESH_BEFORE_EXPIRY`] of expiring.
///
/// The check, the refresh and the read happen under one lock, so concurrent
/// callers are serialized and never observe a token paired with a stale expiry.
pub struct TokenMinter<Provider>
where
    Provider: TokenProvider,
{
    provider: Provider,
    clock: Arc<dyn Clock>,
    cached_token: Mutex<Option<Record>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<RenewalError> {
    #[error("token provider: {0}")]
    Provider(#[source] RenewalError),
}

#[derive(Debug, Clone)]
pub struct Record {
    pub access_token: String,
    pub expires_at: Instant,
}

impl Record {
    pub fn needs_refresh(&self, now: Instant) -> bool {
        now + REFRESH_BEFORE_EXPIRY >= self.expires_at
    }
}

impl super::Token for Record {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl TokenMinter<ClientCredentials> {
    /// Mint the first token for the given service principal right away.
    pub async fn from_credentials(
        client: reqwest::Client,
        client_id: String,
        client_secret: String,
        host: String,
    ) -> Result<Self, super::AuthError> {
        let provider = ClientCredentials {
            client,
            client_id,
            client_secret,
            host,
        };
        Self::new(provider).await
    }
}

impl<Provider> TokenMinter<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Error: std::fmt::Display,
{
    pub async fn new(provider: Provider) -> Result<Self, Error<Provider::Error>> {
        Self::with_clock(provider, Arc::new(SystemClock)).await
    }

    /// Build the minter and fetch its first token. Nothing is returned unless that fetch succeeds.
    pub async fn with_clock(
        provider: Provider,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error<Provider::Error>> {
        let mut minter = Self {
            provider,
            clock,
            cached_token: Mutex::const_new(None),
        };
        let record = minter.fetch_new_token().await?;
        *minter.cached_token.get_mut() = Some(record);
        Ok(minter)
    }

    async fn fetch_new_token(&self) -> Result<Record, Error<Provider::Error>> {
        let token = match self.provider.get_auth_token().await {
            Ok(token) => token,
            Err(err) => {
                error!(message = "Failed to refresh OAuth token", error = %err);
                return Err(Error::Provider(err));
            }
        };
        let record = Record {
            access_token: super::Token::access_token(&token).to_owned(),
            expires_at: self.clock.now() + TOKEN_LIFETIME,
        };
        info!("Successfully refreshed OAuth token");
        Ok(record)
    }

    pub async fn get_record(&self) -> Result<Record, Error<Provider::Error>> {
        let mut cached_token = self.cached_token.lock().await;
        let now = self.clock.now();

        if let Some(cached) = &*cached_token {
            let expires_in = cached.expires_at.saturating_duration_since(now);
            if !cached.needs_refresh(now) {
                debug!(message = "Using preexisting token", token_expires_in = ?expires_in);
                return Ok(cached.clone());
            }
            debug!(message = "Existing token about to expire, refreshing", token_expires_in = ?expires_in);
        }

        info!(
            message = "No usable token found, about to mint a new one",
            token_is_stale = cached_token.is_some(),
        );

        // On failure the previous record stays cached.
        let new_record = self.fetch_new_token().await?;
        cached_token.replace(new_record.clone());

        Ok(new_record)
    }

    /// A token that stays valid for at least [`REFRESH_BEFORE_EXPIRY`].
    pub async fn get_token(&self) -> Result<String, Error<Provider::Error>> {
        let record = self.get_record().await?;
        Ok(record.access_token)
    }

    pub async fn expires_at(&self) -> Option<Instant> {
        self.cached_token
            .lock()
            .await
            .as_ref()
            .map(|record| record.expires_at)
    }
}

#[async_trait::async_trait]
impl<Provider> super::TokenProvider for TokenMinter<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Error: std::fmt::Display,
{
    type Token = Record;
    type Error = Error<Provider::Error>;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        let token = self.get_record().await?;
        Ok(token)
    }
}
