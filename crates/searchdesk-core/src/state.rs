//! Explicit application state. Front ends bind to it; the pipeline mutates it.

use tracing::debug;

use crate::identity::Identity;
use crate::registry::AssetTypeRegistry;
use crate::request::QueryInput;
use crate::types::ResultSet;

/// Streamed generation text.
///
/// Tokens accumulate until the full response text arrives; after that the
/// buffer is finalized and late tokens are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationBuffer {
    text: String,
    finalized: bool,
}

impl GenerationBuffer {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.finalized = false;
    }

    /// Returns `false` when the fragment was dropped.
    pub fn push_token(&mut self, fragment: &str) -> bool {
        if self.finalized { return false; }
        self.text.push_str(fragment);
        true
    }

    pub fn finalize(&mut self, full_text: String) {
        self.text = full_text;
        self.finalized = true;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub registry: AssetTypeRegistry,
    pub input: QueryInput,
    pub results: ResultSet,
    pub generation: GenerationBuffer,
    pub identity: Identity,
    session_id: Option<String>,
    greeting_applied: bool,
}

impl AppState {
    pub fn new(registry: AssetTypeRegistry, input: QueryInput) -> Self {
        Self { registry, input, ..Self::default() }
    }

    /// Current generation session, if one was started.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    pub fn replace_results(&mut self, results: ResultSet) {
        debug!(buckets = results.len(), items = results.total_items(), "replacing results");
        self.results = results;
    }

    /// Start a generation session: new id, empty buffer, greeting pending.
    pub fn begin_generation(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
        self.generation.reset();
        self.greeting_applied = false;
    }

    pub fn greeting_applied(&self) -> bool {
        self.greeting_applied
    }

    /// Apply the one-shot greeting. Returns `false` if one was already applied
    /// in this session.
    pub fn apply_greeting(&mut self, results: ResultSet) -> bool {
        if self.greeting_applied { return false; }
        self.greeting_applied = true;
        self.replace_results(results);
        true
    }

    /// Back to a blank form: query, results and generation cleared.
    pub fn reset(&mut self) {
        self.input.query.clear();
        self.results.clear();
        self.generation.reset();
        self.session_id = None;
        self.greeting_applied = false;
    }
}
