use async_trait::async_trait;

use searchdesk_core::feedback::{CorrectionRecord, VoteRecord};
use searchdesk_core::request::QueryLogEntry;
use searchdesk_core::types::{AssetType, GenerateRequest, GenerateResponse, RawBucket};
use searchdesk_core::SearchRequest;

use crate::error::ClientResult;
use crate::stream::ChannelHandle;

/// Everything the client needs from the search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn asset_types(&self) -> ClientResult<Vec<AssetType>>;

    /// `POST /search/{kind}` with the request's body.
    async fn search(&self, request: &SearchRequest) -> ClientResult<Vec<RawBucket>>;

    async fn generate(&self, request: &GenerateRequest) -> ClientResult<GenerateResponse>;

    /// Subscribe to a generation session's events. Returns once the
    /// subscription is established; events arrive through the handle.
    async fn open_stream(&self, session_id: &str) -> ClientResult<ChannelHandle>;

    /// Username linked to a tracking token, if any.
    async fn lookup_username(&self, token: &str) -> ClientResult<Option<String>>;

    async fn user_exists(&self, username: &str) -> ClientResult<bool>;

    async fn create_user(&self, username: &str) -> ClientResult<()>;

    /// Link a token to a username, creating the user when the backend
    /// supports upsert.
    async fn link_token(&self, username: &str, token: &str, token_source: &str) -> ClientResult<()>;

    async fn send_vote(&self, vote: &VoteRecord) -> ClientResult<()>;

    async fn send_correction(&self, correction: &CorrectionRecord) -> ClientResult<()>;

    async fn log_query(&self, entry: &QueryLogEntry) -> ClientResult<()>;
}
