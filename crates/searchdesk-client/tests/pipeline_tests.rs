// Pipeline and identity behaviour against an in-memory backend that records
// every call it receives.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use searchdesk_client::{
    ChannelHandle, ClientError, ClientResult, IdentityResolver, PipelineOptions, QueryPipeline, SearchBackend,
    StreamEvent, StreamingChannel, SubmitOutcome,
};
use searchdesk_core::config::IdentitySettings;
use searchdesk_core::feedback::{CorrectionRecord, VoteRecord};
use searchdesk_core::identity::{AssociationStrategy, CookieJar};
use searchdesk_core::request::QueryLogEntry;
use searchdesk_core::traits::{LoadingIndicator, UsernamePrompt};
use searchdesk_core::types::{AssetType, GenerateRequest, GenerateResponse, LegacyResults, RawBucket};
use searchdesk_core::{AppState, AssetTypeRegistry, Identity, QueryInput, SearchRequest};

#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<String>>,
    search_response: Mutex<Option<ClientResult<Vec<RawBucket>>>>,
    generate_response: Mutex<Option<ClientResult<GenerateResponse>>>,
    stream_script: Mutex<Vec<StreamEvent>>,
    known_users: Mutex<Vec<String>>,
    linked_username: Option<String>,
    relay_dropped: Arc<AtomicBool>,
    hold_stream_open: bool,
    refuse_stream: bool,
    log_delay: Option<Duration>,
}

impl FakeBackend {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn with_search(self, response: Value) -> Self {
        *self.search_response.lock().unwrap() = Some(Ok(serde_json::from_value(response).expect("raw buckets")));
        self
    }

    fn with_generation(self, response: ClientResult<GenerateResponse>, events: Vec<StreamEvent>) -> Self {
        *self.generate_response.lock().unwrap() = Some(response);
        *self.stream_script.lock().unwrap() = events;
        self
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn asset_types(&self) -> ClientResult<Vec<AssetType>> {
        self.record("asset_types");
        Ok(vec![AssetType::new("doc", "Text", true), AssetType::new("img", "Media", false)])
    }

    async fn search(&self, request: &SearchRequest) -> ClientResult<Vec<RawBucket>> {
        self.record(format!("search:{}", request.search_kind));
        self.search_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ClientError::Status { status: 503, body: "unavailable".into() }))
    }

    async fn generate(&self, request: &GenerateRequest) -> ClientResult<GenerateResponse> {
        self.record(format!("generate:{}", request.model_name));
        // let the scripted events reach the pipeline first
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.generate_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ClientError::Status { status: 500, body: "boom".into() }))
    }

    async fn open_stream(&self, session_id: &str) -> ClientResult<ChannelHandle> {
        self.record(format!("stream:{session_id}"));
        if self.refuse_stream {
            return Err(ClientError::Status { status: 502, body: "no stream".into() });
        }
        let (tx, rx) = mpsc::channel(16);
        for event in self.stream_script.lock().unwrap().drain(..) {
            tx.try_send(event).expect("scripted event fits");
        }
        let relay = if self.hold_stream_open {
            let flag = DropFlag(Arc::clone(&self.relay_dropped));
            Some(tokio::spawn(async move {
                let _flag = flag;
                let _tx = tx;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }))
        } else {
            None
        };
        Ok(ChannelHandle::new(session_id, rx, relay))
    }

    async fn lookup_username(&self, token: &str) -> ClientResult<Option<String>> {
        self.record(format!("lookup:{token}"));
        Ok(self.linked_username.clone())
    }

    async fn user_exists(&self, username: &str) -> ClientResult<bool> {
        self.record(format!("exists:{username}"));
        Ok(self.known_users.lock().unwrap().iter().any(|u| u == username))
    }

    async fn create_user(&self, username: &str) -> ClientResult<()> {
        self.record(format!("create:{username}"));
        self.known_users.lock().unwrap().push(username.to_string());
        Ok(())
    }

    async fn link_token(&self, username: &str, token: &str, token_source: &str) -> ClientResult<()> {
        self.record(format!("link:{username}:{token}:{token_source}"));
        Ok(())
    }

    async fn send_vote(&self, vote: &VoteRecord) -> ClientResult<()> {
        self.record(format!("vote:{}:{}", vote.chunk_id, vote.vote_value));
        Ok(())
    }

    async fn send_correction(&self, correction: &CorrectionRecord) -> ClientResult<()> {
        self.record(format!("correction:{}", correction.summary_text));
        Ok(())
    }

    async fn log_query(&self, entry: &QueryLogEntry) -> ClientResult<()> {
        if let Some(delay) = self.log_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("querylog:{}", entry.query_type));
        Ok(())
    }
}

#[derive(Default)]
struct CountingIndicator {
    shown: AtomicUsize,
    hidden: AtomicUsize,
}

impl LoadingIndicator for CountingIndicator {
    fn show(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }
    fn hide(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingPrompt(AtomicUsize);

impl UsernamePrompt for CountingPrompt {
    fn prompt_for_username(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn registry() -> AssetTypeRegistry {
    AssetTypeRegistry::from_feed(vec![AssetType::new("doc", "Text", true), AssetType::new("img", "Media", false)])
}

fn app_state(query: &str) -> AppState {
    AppState::new(registry(), QueryInput::new(query, 10))
}

fn setup(backend: FakeBackend) -> (QueryPipeline<FakeBackend>, Arc<FakeBackend>, Arc<CountingIndicator>) {
    let backend = Arc::new(backend);
    let indicator = Arc::new(CountingIndicator::default());
    let pipeline = QueryPipeline::new(Arc::clone(&backend), indicator.clone(), PipelineOptions::default());
    (pipeline, backend, indicator)
}

fn doc_bucket() -> Value {
    json!([{
        "asset_type": "doc",
        "display_title": "Documents",
        "results": [{
            "id": "doc:1",
            "document_title": "Intro",
            "heading_section_index": "[1, 1, 2]",
            "heading_section_title": "[\"A\", \"A\", \"B\"]"
        }]
    }])
}

fn greeting() -> StreamEvent {
    StreamEvent::Greeting(LegacyResults {
        results: vec![vec![serde_json::from_value(json!({"id": "g:1", "paragraph_index": "[3, 3]"})).unwrap()]],
        asset_types: vec!["doc".into()],
        display_titles: vec!["Documents".into()],
    })
}

#[tokio::test]
async fn empty_query_clears_without_calling_backend() {
    let (pipeline, backend, indicator) = setup(FakeBackend::default());
    let mut state = app_state("   ");
    state.results = searchdesk_core::ResultSet::error_placeholder();

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::EmptyQuery);
    assert!(state.results.is_empty());
    assert!(backend.calls().is_empty());
    assert_eq!(indicator.shown.load(Ordering::SeqCst), 1);
    assert_eq!(indicator.hidden.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_selected_asset_types_skips_search_and_generation() {
    let (pipeline, backend, _) = setup(FakeBackend::default());
    let mut state = AppState::new(
        AssetTypeRegistry::from_feed(vec![AssetType::new("doc", "Text", false)]),
        QueryInput::new("hello", 10),
    );
    let mut channel = StreamingChannel::new();

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::NoAssetTypes);
    assert_eq!(pipeline.submit_generation(&mut state, &mut channel, |_| {}).await, SubmitOutcome::NoAssetTypes);
    assert!(!channel.is_open());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn successful_search_replaces_normalized_results() {
    let (pipeline, backend, _) = setup(FakeBackend::default().with_search(doc_bucket()));
    let mut state = app_state("hello");

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::Completed);
    assert_eq!(backend.calls(), vec!["search:semantic"]);
    let bucket = &state.results.buckets()[0];
    assert_eq!(bucket.display_title, "Documents");
    assert!(bucket.visible);
    assert_eq!(bucket.items[0].heading_path(), Some("1, 2"));
    assert_eq!(bucket.items[0].heading_titles(), Some("A, B"));
}

#[tokio::test]
async fn decode_failure_clears_results() {
    let malformed = json!([{
        "asset_type": "doc",
        "results": [
            {"id": "ok", "paragraph_index": "[1]"},
            {"id": "bad", "paragraph_index": "[1,"}
        ]
    }]);
    let (pipeline, _, _) = setup(FakeBackend::default().with_search(malformed));
    let mut state = app_state("hello");
    state.results = searchdesk_core::ResultSet::error_placeholder();

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::Failed);
    assert!(state.results.is_empty());
}

#[tokio::test]
async fn network_failure_clears_results() {
    let (pipeline, _, indicator) = setup(FakeBackend::default());
    let mut state = app_state("hello");

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::Failed);
    assert!(state.results.is_empty());
    assert_eq!(indicator.hidden.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_is_logged_only_with_a_token() {
    let (pipeline, backend, _) = setup(FakeBackend::default().with_search(doc_bucket()));
    let mut state = app_state("hello");
    state.identity = Identity { username: "jane".into(), token: "t-1".into(), token_source: "s_vi".into() };

    pipeline.submit(&mut state).await;
    pipeline.flush().await;
    assert!(backend.calls().contains(&"querylog:semantic".to_string()));

    let (pipeline, backend, _) = setup(FakeBackend::default().with_search(doc_bucket()));
    let mut state = app_state("hello");
    pipeline.submit(&mut state).await;
    pipeline.flush().await;
    assert!(!backend.calls().iter().any(|c| c.starts_with("querylog")));
}

#[tokio::test]
async fn flush_waits_for_slow_query_log() {
    let backend = FakeBackend { log_delay: Some(Duration::from_millis(50)), ..FakeBackend::default() };
    let (pipeline, backend, _) = setup(backend.with_search(doc_bucket()));
    let mut state = app_state("hello");
    state.identity = Identity { username: "jane".into(), token: "t-1".into(), token_source: "s_vi".into() };

    assert_eq!(pipeline.submit(&mut state).await, SubmitOutcome::Completed);
    assert!(!backend.calls().iter().any(|c| c.starts_with("querylog")), "log is still in flight");
    pipeline.flush().await;
    assert!(backend.calls().contains(&"querylog:semantic".to_string()));
    // a second flush has nothing left to wait for
    tokio::time::timeout(Duration::from_millis(10), pipeline.flush()).await.expect("nothing pending");
}

#[tokio::test]
async fn generation_applies_greeting_tokens_then_final_text() {
    let events = vec![greeting(), StreamEvent::Publish("Hel".into()), StreamEvent::Publish("lo".into())];
    let response = GenerateResponse { generation: "Hello world".into(), search: None };
    let (pipeline, backend, indicator) = setup(FakeBackend::default().with_generation(Ok(response), events));
    let mut state = app_state("hello");
    let mut channel = StreamingChannel::new();
    let mut snapshots = Vec::new();

    let outcome = pipeline
        .submit_generation(&mut state, &mut channel, |s| snapshots.push(s.generation.as_str().to_string()))
        .await;

    assert_eq!(outcome, SubmitOutcome::Completed);
    assert!(snapshots.contains(&"Hello".to_string()), "tokens are visible before the final text: {snapshots:?}");
    assert_eq!(state.generation.as_str(), "Hello world");
    assert!(state.generation.is_finalized());
    assert!(state.greeting_applied());
    assert_eq!(state.results.buckets()[0].items[0].paragraph_path(), Some("3, 3"));
    assert!(indicator.hidden.load(Ordering::SeqCst) >= 2, "greeting hides the indicator early");

    let calls = backend.calls();
    let session = state.session_id().expect("session id");
    assert_eq!(calls[0], format!("stream:{session}"));
    assert_eq!(calls[1], "generate:nim_mixtral_8x7b");
}

#[tokio::test]
async fn generation_falls_back_to_response_results_without_greeting() {
    let search = LegacyResults {
        results: vec![vec![serde_json::from_value(json!({"id": "r:1"})).unwrap()]],
        asset_types: vec!["doc".into()],
        display_titles: vec!["Documents".into()],
    };
    let response = GenerateResponse { generation: "answer".into(), search: Some(search) };
    let (pipeline, _, _) = setup(FakeBackend::default().with_generation(Ok(response), vec![]));
    let mut state = app_state("hello");
    let mut channel = StreamingChannel::new();

    pipeline.submit_generation(&mut state, &mut channel, |_| {}).await;
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.results.buckets()[0].items[0].chunk_id(), Some("r:1"));
}

#[tokio::test]
async fn generation_completes_when_stream_cannot_open() {
    let response = GenerateResponse { generation: "offline answer".into(), search: None };
    let backend = FakeBackend { refuse_stream: true, ..FakeBackend::default() };
    let (pipeline, backend, indicator) = setup(backend.with_generation(Ok(response), vec![]));
    let mut state = app_state("hello");
    let mut channel = StreamingChannel::new();

    let outcome = pipeline.submit_generation(&mut state, &mut channel, |_| {}).await;
    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(state.generation.as_str(), "offline answer");
    assert!(state.generation.is_finalized());
    assert!(!channel.is_open());
    assert!(backend.calls().contains(&"generate:nim_mixtral_8x7b".to_string()));
    assert_eq!(indicator.shown.load(Ordering::SeqCst), indicator.hidden.load(Ordering::SeqCst));
}

#[tokio::test]
async fn generation_failure_shows_placeholder_and_clears_buffer() {
    let events = vec![StreamEvent::Publish("partial".into()), StreamEvent::Error("redis down".into())];
    let failure = Err(ClientError::Status { status: 500, body: "boom".into() });
    let (pipeline, _, _) = setup(FakeBackend::default().with_generation(failure, events));
    let mut state = app_state("hello");
    let mut channel = StreamingChannel::new();

    assert_eq!(pipeline.submit_generation(&mut state, &mut channel, |_| {}).await, SubmitOutcome::Failed);
    assert_eq!(state.results.len(), 1);
    let item = &state.results.buckets()[0].items[0];
    assert_eq!(item.str_field("title"), Some("Error"));
    assert_eq!(item.str_field("blurb"), Some("Error"));
    assert_eq!(state.generation.as_str(), "");
}

#[tokio::test]
async fn repeated_greeting_is_ignored() {
    let (pipeline, _, _) = setup(FakeBackend::default());
    let mut state = app_state("hello");
    state.begin_generation("s1");

    pipeline.apply_event(&mut state, greeting());
    let first = state.results.clone();
    let mut other = LegacyResults::default();
    other.results.push(vec![]);
    other.asset_types.push("img".into());
    pipeline.apply_event(&mut state, StreamEvent::Greeting(other));
    assert_eq!(state.results, first);
}

#[tokio::test]
async fn late_tokens_after_final_text_are_dropped() {
    let (pipeline, _, _) = setup(FakeBackend::default());
    let mut state = app_state("hello");
    state.begin_generation("s1");
    pipeline.apply_event(&mut state, StreamEvent::Publish("Hel".into()));
    state.generation.finalize("Hello".into());
    pipeline.apply_event(&mut state, StreamEvent::Publish("lo".into()));
    assert_eq!(state.generation.as_str(), "Hello");
}

#[tokio::test]
async fn new_generation_closes_previous_channel() {
    let backend = FakeBackend { hold_stream_open: true, ..FakeBackend::default() };
    let dropped = Arc::clone(&backend.relay_dropped);
    let backend = Arc::new(backend);
    let mut channel = StreamingChannel::new();

    channel.open(backend.as_ref(), "first").await.expect("open first");
    assert_eq!(channel.session_id(), Some("first"));
    channel.open(backend.as_ref(), "second").await.expect("open second");
    assert_eq!(channel.session_id(), Some("second"));

    tokio::time::timeout(Duration::from_secs(2), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first relay task aborted");
}

#[tokio::test]
async fn remove_asset_hides_type_and_resubmits() {
    let (pipeline, backend, _) = setup(FakeBackend::default().with_search(doc_bucket()));
    let mut state = app_state("hello");
    pipeline.submit(&mut state).await;

    // only type left is hidden, so the resubmission exits early
    assert_eq!(pipeline.remove_asset(&mut state, 0).await, SubmitOutcome::NoAssetTypes);
    assert_eq!(state.registry.get("doc").map(|a| a.display), Some(false));
    assert!(state.results.is_empty());
    assert_eq!(backend.calls(), vec!["search:semantic"]);
}

#[tokio::test]
async fn vote_and_correction_are_sent() {
    let (pipeline, backend, _) = setup(FakeBackend::default().with_search(doc_bucket()));
    let mut state = app_state("hello");
    state.identity.username = "jane".into();
    pipeline.submit(&mut state).await;

    pipeline.vote(&state, 0, 0, 1).await.expect("vote");
    pipeline.correct(&state, "orig", "better", None).await.expect("correction");
    assert!(pipeline.vote(&state, 3, 0, 1).await.is_err());

    let calls = backend.calls();
    assert!(calls.contains(&"vote:doc:1:1".to_string()));
    assert!(calls.contains(&"correction:better".to_string()));
}

#[tokio::test]
async fn load_asset_types_replaces_registry() {
    let (pipeline, _, _) = setup(FakeBackend::default());
    let mut state = AppState::default();
    pipeline.load_asset_types(&mut state).await.expect("feed");
    assert_eq!(state.registry.selected_names(), vec!["doc"]);
}

fn identity_settings(strategy: AssociationStrategy) -> IdentitySettings {
    IdentitySettings { association: strategy, ..IdentitySettings::default() }
}

#[tokio::test]
async fn resolve_uses_first_cookie_and_linked_username() {
    let backend = Arc::new(FakeBackend { linked_username: Some("jane".into()), ..FakeBackend::default() });
    let resolver = IdentityResolver::new(Arc::clone(&backend), IdentitySettings::default());
    let prompt = CountingPrompt::default();

    let identity = resolver.resolve(&CookieJar::parse("s_fid=fid-1; s_vi=vi-1"), &prompt).await;
    assert_eq!(identity.username, "jane");
    assert_eq!(identity.token, "vi-1");
    assert_eq!(identity.token_source, "s_vi");
    assert_eq!(prompt.0.load(Ordering::SeqCst), 0);
    assert_eq!(backend.calls(), vec!["lookup:vi-1"]);
}

#[tokio::test]
async fn resolve_prompts_when_unresolved() {
    let backend = Arc::new(FakeBackend::default());
    let resolver = IdentityResolver::new(Arc::clone(&backend), IdentitySettings::default());
    let prompt = CountingPrompt::default();

    let identity = resolver.resolve(&CookieJar::parse(""), &prompt).await;
    assert_eq!(identity, Identity::default());
    assert!(backend.calls().is_empty(), "no token, no lookup");

    let identity = resolver.resolve(&CookieJar::parse("_cs_id=cs-1"), &prompt).await;
    assert!(!identity.is_resolved());
    assert_eq!(prompt.0.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dev_identity_uses_fixed_token() {
    let backend = Arc::new(FakeBackend { linked_username: Some("dev".into()), ..FakeBackend::default() });
    let settings = IdentitySettings { dev_username: Some("dev".into()), ..IdentitySettings::default() };
    let resolver = IdentityResolver::new(Arc::clone(&backend), settings);

    let identity = resolver.resolve(&CookieJar::parse("s_vi=ignored"), &CountingPrompt::default()).await;
    assert_eq!(identity.token, "devcookie");
    assert_eq!(identity.token_source, "dev");
    assert_eq!(backend.calls(), vec!["lookup:devcookie"]);
}

#[tokio::test]
async fn upsert_association_links_in_one_call() {
    let backend = Arc::new(FakeBackend::default());
    let resolver = IdentityResolver::new(Arc::clone(&backend), identity_settings(AssociationStrategy::Upsert));
    let mut identity = Identity { username: String::new(), token: "vi-1".into(), token_source: "s_vi".into() };

    resolver.associate(&mut identity, "  Jane ").await.expect("associate");
    assert_eq!(identity.username, "jane");
    assert_eq!(backend.calls(), vec!["link:jane:vi-1:s_vi"]);
}

#[tokio::test]
async fn check_then_create_association_creates_missing_user() {
    let backend = Arc::new(FakeBackend::default());
    let resolver = IdentityResolver::new(Arc::clone(&backend), identity_settings(AssociationStrategy::CheckThenCreate));
    let mut identity = Identity { username: String::new(), token: "vi-1".into(), token_source: "s_vi".into() };

    resolver.associate(&mut identity, "Jane").await.expect("first");
    resolver.associate(&mut identity, "jane").await.expect("second");
    assert_eq!(
        backend.calls(),
        vec!["exists:jane", "create:jane", "link:jane:vi-1:s_vi", "exists:jane", "link:jane:vi-1:s_vi"]
    );
}

#[tokio::test]
async fn association_without_token_makes_no_calls() {
    let backend = Arc::new(FakeBackend::default());
    let resolver = IdentityResolver::new(Arc::clone(&backend), IdentitySettings::default());
    let mut identity = Identity::default();

    resolver.associate(&mut identity, "Jane").await.expect("local only");
    assert_eq!(identity.username, "jane");
    assert!(backend.calls().is_empty());
    assert!(resolver.associate(&mut identity, "   ").await.is_err());
}
