//! `reqwest` implementation of [`SearchBackend`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use searchdesk_core::config::BackendSettings;
use searchdesk_core::feedback::{CorrectionRecord, VoteRecord};
use searchdesk_core::request::QueryLogEntry;
use searchdesk_core::types::{AssetType, GenerateRequest, GenerateResponse, RawBucket};
use searchdesk_core::SearchRequest;

use crate::backend::SearchBackend;
use crate::error::{ClientError, ClientResult};
use crate::stream::{channel_name, spawn_relay, ChannelHandle};

#[derive(Deserialize)]
struct IdentityLookup {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Serialize)]
struct NewUser<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct TokenLink<'a> {
    token: &'a str,
    token_source: &'a str,
}

/// Talks to the search router over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client: Client::builder().build()?, base_url, timeout: None })
    }

    pub fn from_settings(settings: &BackendSettings) -> ClientResult<Self> {
        let backend = Self::new(&settings.base_url)?;
        Ok(match settings.timeout() {
            Some(timeout) => backend.with_timeout(timeout),
            None => backend,
        })
    }

    /// Per-request timeout for everything but the event stream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_deadline(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> ClientResult<Response> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.with_deadline(self.client.get(url).query(query)).send().await?;
        Ok(response)
    }

    async fn post<T: Serialize + ?Sized>(&self, segments: &[&str], body: &T) -> ClientResult<Response> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.with_deadline(self.client.post(url).json(body)).send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn asset_types(&self) -> ClientResult<Vec<AssetType>> {
        let response = check_status(self.get(&["asset-types"], &[]).await?).await?;
        Ok(response.json().await?)
    }

    async fn search(&self, request: &SearchRequest) -> ClientResult<Vec<RawBucket>> {
        let body = request.search_body();
        debug!(body = %body, "search request");
        let response = self.post(&["search", request.search_kind.as_str()], &body).await?;
        Ok(response.json().await?)
    }

    async fn generate(&self, request: &GenerateRequest) -> ClientResult<GenerateResponse> {
        let response = self.post(&["generate"], request).await?;
        Ok(response.json().await?)
    }

    async fn open_stream(&self, session_id: &str) -> ClientResult<ChannelHandle> {
        let mut url = self.endpoint(&["stream"])?;
        url.query_pairs_mut().append_pair("channel", &channel_name(session_id));
        debug!(%url, "opening event stream");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(spawn_relay(session_id.to_string(), response))
    }

    async fn lookup_username(&self, token: &str) -> ClientResult<Option<String>> {
        let response = self.get(&["identity"], &[("token", token)]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let lookup: IdentityLookup = check_status(response).await?.json().await?;
        Ok(lookup.username.filter(|name| !name.is_empty()))
    }

    async fn user_exists(&self, username: &str) -> ClientResult<bool> {
        let response = self.get(&["identity", username], &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    async fn create_user(&self, username: &str) -> ClientResult<()> {
        self.post(&["identity"], &NewUser { username }).await?;
        Ok(())
    }

    async fn link_token(&self, username: &str, token: &str, token_source: &str) -> ClientResult<()> {
        self.post(&["identity", username, "tokens"], &TokenLink { token, token_source }).await?;
        Ok(())
    }

    async fn send_vote(&self, vote: &VoteRecord) -> ClientResult<()> {
        self.post(&["feedback"], vote).await?;
        Ok(())
    }

    async fn send_correction(&self, correction: &CorrectionRecord) -> ClientResult<()> {
        self.post(&["feedback"], correction).await?;
        Ok(())
    }

    async fn log_query(&self, entry: &QueryLogEntry) -> ClientResult<()> {
        self.post(&["querylog"], entry).await?;
        Ok(())
    }
}
