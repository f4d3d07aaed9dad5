//! Query submission: search, streamed generation, and the actions that hang
//! off a result set (remove an asset type, share, vote, correct).

use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use searchdesk_core::config::SearchSettings;
use searchdesk_core::feedback::{CorrectionRecord, VoteRecord};
use searchdesk_core::normalize::{normalize_buckets, ParagraphJoin};
use searchdesk_core::request::{build_search_request, QueryLogEntry};
use searchdesk_core::traits::{LoadingGuard, LoadingIndicator};
use searchdesk_core::types::ResultSet;
use searchdesk_core::{AppState, AssetTypeRegistry, SearchRequest, Submission};

use reqwest::Url;

use crate::backend::SearchBackend;
use crate::error::{ClientError, ClientResult};
use crate::stream::{StreamEvent, StreamingChannel};

/// Query-log type recorded for generation submissions.
pub const GENERATION_QUERY_TYPE: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub paragraph_join: ParagraphJoin,
    pub model_name: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self { paragraph_join: settings.paragraph_join, model_name: settings.model_name.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    EmptyQuery,
    NoAssetTypes,
    Completed,
    /// The backend call or decoding failed; see the logs.
    Failed,
}

pub struct QueryPipeline<B> {
    backend: Arc<B>,
    indicator: Arc<dyn LoadingIndicator>,
    options: PipelineOptions,
    /// Query-log posts still in flight. Dropping the pipeline aborts them.
    pending_logs: Mutex<JoinSet<()>>,
}

impl<B: SearchBackend + 'static> QueryPipeline<B> {
    pub fn new(backend: Arc<B>, indicator: Arc<dyn LoadingIndicator>, options: PipelineOptions) -> Self {
        Self { backend, indicator, options, pending_logs: Mutex::new(JoinSet::new()) }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Replace the registry with the backend's asset-type feed.
    pub async fn load_asset_types(&self, state: &mut AppState) -> ClientResult<()> {
        let feed = self
            .backend
            .asset_types()
            .await
            .inspect_err(|error| warn!(%error, "loading asset types failed"))?;
        info!(count = feed.len(), "asset types loaded");
        state.registry = AssetTypeRegistry::from_feed(feed);
        Ok(())
    }

    /// Run a search for the current input. Results are replaced on success
    /// and cleared on every other path.
    pub async fn submit(&self, state: &mut AppState) -> SubmitOutcome {
        let _loading = LoadingGuard::show(self.indicator.as_ref());
        let request = match self.prepare(state) {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };
        info!(kind = %request.search_kind, asset_types = ?request.selected_asset_type_names, "submitting search");
        state.clear_results();
        self.log_query(state, request.search_kind.as_str(), &request.search_body().to_string());

        match self.search(&request).await {
            Ok(results) => {
                state.replace_results(results);
                SubmitOutcome::Completed
            }
            Err(error) => {
                warn!(%error, "search failed");
                state.clear_results();
                SubmitOutcome::Failed
            }
        }
    }

    async fn search(&self, request: &SearchRequest) -> ClientResult<ResultSet> {
        let raw = self.backend.search(request).await?;
        Ok(normalize_buckets(raw, self.options.paragraph_join)?)
    }

    /// Start a streamed generation for the current input.
    ///
    /// A fresh session channel is opened (closing the previous one) and
    /// consumed while `POST /generate` is in flight. `on_update` runs after
    /// every state change so a front end can redraw.
    pub async fn submit_generation<F>(&self, state: &mut AppState, channel: &mut StreamingChannel, mut on_update: F) -> SubmitOutcome
    where
        F: FnMut(&AppState),
    {
        let _loading = LoadingGuard::show(self.indicator.as_ref());
        state.generation.reset();
        let request = match self.prepare(state) {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        let session_id = Uuid::new_v4().to_string();
        info!(session = %session_id, asset_types = ?request.selected_asset_type_names, "submitting generation");
        state.begin_generation(session_id.clone());
        let body = request.generate_body(&session_id, &self.options.model_name);
        match serde_json::to_string(&body) {
            Ok(text) => self.log_query(state, GENERATION_QUERY_TYPE, &text),
            Err(error) => debug!(%error, "query log body not serializable"),
        }

        let mut streaming = match channel.open(self.backend.as_ref(), &session_id).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, session = %session_id, "event stream unavailable");
                false
            }
        };

        let generate = self.backend.generate(&body);
        tokio::pin!(generate);
        let result = loop {
            let next_event = async {
                match channel.current_mut() {
                    Some(handle) => handle.next_event().await,
                    None => None,
                }
            };
            tokio::select! {
                result = &mut generate => break result,
                event = next_event, if streaming => match event {
                    Some(event) => {
                        self.apply_event(state, event);
                        on_update(&*state);
                    }
                    None => streaming = false,
                },
            }
        };

        while let Some(event) = channel.current_mut().and_then(|handle| handle.try_next_event()) {
            self.apply_event(state, event);
        }

        let outcome = match result {
            Ok(response) => {
                if !state.greeting_applied() {
                    if let Some(search) = response.search {
                        match normalize_buckets(search.into_raw_buckets(), self.options.paragraph_join) {
                            Ok(results) => {
                                state.apply_greeting(results);
                            }
                            Err(error) => {
                                warn!(%error, "generation results failed to decode");
                                state.clear_results();
                            }
                        }
                    }
                }
                state.generation.finalize(response.generation);
                SubmitOutcome::Completed
            }
            Err(error) => {
                warn!(%error, session = %session_id, "generation failed");
                state.replace_results(ResultSet::error_placeholder());
                state.generation.reset();
                SubmitOutcome::Failed
            }
        };
        on_update(&*state);
        outcome
    }

    /// Apply one stream event to `state`.
    pub fn apply_event(&self, state: &mut AppState, event: StreamEvent) {
        match event {
            StreamEvent::Greeting(legacy) => match normalize_buckets(legacy.into_raw_buckets(), self.options.paragraph_join) {
                Ok(results) => {
                    if state.apply_greeting(results) {
                        self.indicator.hide();
                    } else {
                        debug!("ignoring repeated greeting");
                    }
                }
                Err(error) => {
                    warn!(%error, "greeting failed to decode");
                    state.clear_results();
                }
            },
            StreamEvent::Publish(fragment) => {
                if !state.generation.push_token(&fragment) {
                    debug!("dropping token after final text");
                }
            }
            StreamEvent::Error(message) => warn!(session = ?state.session_id(), %message, "stream error"),
        }
    }

    /// Hide the asset type of bucket `bucket_index` and search again.
    pub async fn remove_asset(&self, state: &mut AppState, bucket_index: usize) -> SubmitOutcome {
        if let Some(bucket) = state.results.get(bucket_index) {
            let name = bucket.asset_type.clone();
            if state.registry.hide(&name) {
                debug!(asset_type = %name, "asset type removed from results");
            }
        }
        self.submit(state).await
    }

    pub async fn vote(&self, state: &AppState, bucket_index: usize, result_index: usize, value: i32) -> ClientResult<()> {
        let vote = VoteRecord::for_result(state, bucket_index, result_index, value)?;
        self.backend.send_vote(&vote).await.inspect_err(|error| warn!(%error, "sending vote failed"))?;
        info!(chunk = %vote.chunk_id, value, "vote recorded");
        Ok(())
    }

    pub async fn correct(&self, state: &AppState, original_text: &str, summary_text: &str, url: Option<&str>) -> ClientResult<()> {
        let correction = CorrectionRecord::new(state, original_text, summary_text, url);
        self.backend
            .send_correction(&correction)
            .await
            .inspect_err(|error| warn!(%error, "sending correction failed"))?;
        Ok(())
    }

    fn prepare(&self, state: &mut AppState) -> Result<SearchRequest, SubmitOutcome> {
        match build_search_request(&state.input, &state.registry) {
            Submission::Ready(request) => Ok(request),
            Submission::EmptyQuery => {
                debug!("empty query, nothing to submit");
                state.clear_results();
                Err(SubmitOutcome::EmptyQuery)
            }
            Submission::NoAssetTypes => {
                debug!("no asset types selected, nothing to submit");
                state.clear_results();
                Err(SubmitOutcome::NoAssetTypes)
            }
        }
    }

    fn log_query(&self, state: &AppState, query_type: &str, query: &str) {
        let Some(entry) = QueryLogEntry::new(&state.identity.token, query_type, query) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let mut pending = self.pending_logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            if let Err(error) = backend.log_query(&entry).await {
                warn!(%error, "query log failed");
            }
        });
    }

    /// Wait for every query-log post started so far. Call before the
    /// runtime shuts down so none of them are cancelled.
    pub async fn flush(&self) {
        let mut pending = {
            let mut slot = self.pending_logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *slot)
        };
        debug!(pending = pending.len(), "flushing query logs");
        while let Some(joined) = pending.join_next().await {
            if let Err(error) = joined {
                warn!(%error, "query log task failed");
            }
        }
    }
}

/// Link that reopens the current query: `?query=&k=&asset_types=...` with
/// one `asset_types` pair per displayed asset type.
pub fn share_link(base_url: &str, state: &AppState) -> ClientResult<String> {
    let mut url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("query", state.input.query.trim());
        pairs.append_pair("k", &state.input.limit.to_string());
        for name in state.registry.selected_names() {
            pairs.append_pair("asset_types", &name);
        }
    }
    Ok(url.to_string())
}
