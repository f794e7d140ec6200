// HTTP implementation of SocialGraphClient.
//
// A thin reqwest wrapper over the v1.1-style REST endpoints plus the
// line-delimited JSON sample stream. The user credential is a configured
// bearer token; the app credential is minted through the client-credentials
// grant and re-minted on every reauthenticate().
//
// Status codes map onto ApiError kinds here, so the layers above only ever
// branch on the error enum.

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::client::{SocialGraphClient, MAX_LOOKUP_SIZE};
use super::error::ApiError;
use super::stream::{SampleBuffer, StreamHandle};
use super::types::{Credential, IdPage, Status, User};
use crate::config::Config;

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com";

/// Default sample-stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "https://stream.twitter.com/1.1/statuses/sample.json";

pub struct HttpSocialClient {
    client: reqwest::Client,
    api_url: String,
    stream_url: String,
    consumer_key: String,
    consumer_secret: String,
    user_token: String,
    app_token: RwLock<Option<String>>,
}

impl HttpSocialClient {
    /// Build a client from the loaded configuration. No request is made
    /// until the first call; the app token is minted lazily.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ripple/0.1 (reshare-cascade monitor)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            stream_url: config.stream_url.clone(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            user_token: config.user_token.clone(),
            app_token: RwLock::new(None),
        })
    }

    fn cached_app_token(&self) -> Option<String> {
        self.app_token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Exchange the consumer key/secret for an application-only bearer token.
    async fn mint_app_token(&self) -> Result<String, ApiError> {
        let url = format!("{}/oauth2/token", self.api_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        *self
            .app_token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token.access_token.clone());
        info!("Application token minted");
        Ok(token.access_token)
    }

    async fn bearer(&self, credential: Credential) -> Result<String, ApiError> {
        match credential {
            Credential::User => Ok(self.user_token.clone()),
            Credential::App => match self.cached_app_token() {
                Some(token) => Ok(token),
                None => self.mint_app_token().await,
            },
        }
    }

    /// GET a REST endpoint and deserialize the response.
    ///
    /// `path` is relative to the API root (e.g. "1.1/statuses/show.json").
    async fn api_get<T: DeserializeOwned>(
        &self,
        credential: Credential,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.api_url, path);
        let token = self.bearer(credential).await?;

        debug!(path = path, credential = %credential, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| ApiError::Connection(format!("{path}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), format!("{path}: {body}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Connection(format!("{path}: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Malformed(format!("{path}: {e}")))
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .take(MAX_LOOKUP_SIZE)
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl SocialGraphClient for HttpSocialClient {
    async fn get_status(&self, id: u64) -> Result<Status, ApiError> {
        self.api_get(
            Credential::User,
            "1.1/statuses/show.json",
            &[("id", id.to_string()), ("tweet_mode", "extended".to_string())],
        )
        .await
    }

    async fn lookup_statuses(&self, ids: &[u64]) -> Result<Vec<Status>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.api_get(
            Credential::User,
            "1.1/statuses/lookup.json",
            &[("id", join_ids(ids)), ("tweet_mode", "extended".to_string())],
        )
        .await
    }

    async fn recent_resharers(
        &self,
        credential: Credential,
        id: u64,
        limit: u32,
    ) -> Result<Vec<User>, ApiError> {
        let reshares: Vec<Status> = self
            .api_get(
                credential,
                &format!("1.1/statuses/retweets/{id}.json"),
                &[("count", limit.to_string())],
            )
            .await?;
        Ok(reshares.into_iter().map(|status| status.user).collect())
    }

    async fn resharer_ids(&self, credential: Credential, id: u64) -> Result<Vec<u64>, ApiError> {
        let page: IdPage = self
            .api_get(
                credential,
                "1.1/statuses/retweeters/ids.json",
                &[("id", id.to_string()), ("cursor", "-1".to_string())],
            )
            .await?;
        Ok(page.ids)
    }

    async fn lookup_users(&self, ids: &[u64]) -> Result<Vec<User>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.api_get(
            Credential::User,
            "1.1/users/lookup.json",
            &[("user_id", join_ids(ids))],
        )
        .await
    }

    async fn follower_ids(
        &self,
        credential: Credential,
        user_id: u64,
        cursor: i64,
    ) -> Result<IdPage, ApiError> {
        self.api_get(
            credential,
            "1.1/followers/ids.json",
            &[
                ("user_id", user_id.to_string()),
                ("cursor", cursor.to_string()),
                ("count", "5000".to_string()),
            ],
        )
        .await
    }

    async fn open_sample(&self, buffer: Arc<SampleBuffer>) -> Result<StreamHandle, ApiError> {
        let response = self
            .client
            .get(&self.stream_url)
            .bearer_auth(&self.user_token)
            .send()
            .await
            .map_err(|e| ApiError::Connection(format!("sample stream: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), format!("sample stream: {body}")));
        }

        let task = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        buffer.report_error(e.to_string());
                        return;
                    }
                };
                pending.extend_from_slice(&bytes);

                while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=newline).collect();
                    let line = line.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    // Delete notices and limit messages are not statuses.
                    match serde_json::from_slice::<Status>(line) {
                        Ok(status) => buffer.push(status),
                        Err(e) => debug!(error = %e, "Skipping non-status stream message"),
                    }
                }

                if buffer.limit_hit() {
                    return;
                }
            }

            buffer.report_error("sample stream closed by remote");
        });

        Ok(StreamHandle::spawn(task))
    }

    async fn reauthenticate(&self) -> Result<(), ApiError> {
        *self
            .app_token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        self.mint_app_token().await.map(|_| ())
    }
}

// -- Serde types for the token endpoint --

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}
