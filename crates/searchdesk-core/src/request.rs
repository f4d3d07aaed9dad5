//! Request shaping: from current input and registry to backend payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::registry::AssetTypeRegistry;
use crate::types::{GenerateRequest, KeywordMode, SearchKind, SearchRequest};

pub const DEFAULT_KEYWORD_FIELD: &str = "content";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordOptions {
    pub field: String,
    pub mode: KeywordMode,
}

impl Default for KeywordOptions {
    fn default() -> Self {
        Self { field: DEFAULT_KEYWORD_FIELD.to_string(), mode: KeywordMode::Union }
    }
}

/// The form: what the user typed and picked, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInput {
    pub query: String,
    pub limit: u32,
    pub search_kind: SearchKind,
    pub keyword: KeywordOptions,
}

impl Default for QueryInput {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: 5,
            search_kind: SearchKind::Semantic,
            keyword: KeywordOptions::default(),
        }
    }
}

impl QueryInput {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self { query: query.into(), limit, ..Self::default() }
    }

    pub fn keyword(mut self, field: impl Into<String>, mode: KeywordMode) -> Self {
        self.search_kind = SearchKind::Keyword;
        self.keyword = KeywordOptions { field: field.into(), mode };
        self
    }
}

/// Outcome of validating a submission before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The trimmed query is empty.
    EmptyQuery,
    /// No asset type is displayed.
    NoAssetTypes,
    Ready(SearchRequest),
}

pub fn build_search_request(input: &QueryInput, registry: &AssetTypeRegistry) -> Submission {
    let query_text = input.query.trim();
    if query_text.is_empty() { return Submission::EmptyQuery; }

    let selected = registry.selected_names();
    if selected.is_empty() { return Submission::NoAssetTypes; }

    let keyword = input.search_kind == SearchKind::Keyword;
    Submission::Ready(SearchRequest {
        query_text: query_text.to_string(),
        result_limit: input.limit,
        selected_asset_type_names: selected,
        search_kind: input.search_kind,
        keyword_field: keyword.then(|| input.keyword.field.clone()),
        keyword_mode: keyword.then_some(input.keyword.mode),
    })
}

impl SearchRequest {
    /// Body of `POST /search/{kind}`.
    pub fn search_body(&self) -> Value {
        let mut body = json!({
            "k": self.result_limit,
            "asset_types": self.selected_asset_type_names,
        });
        if let Some(obj) = body.as_object_mut() {
            match self.search_kind {
                SearchKind::Keyword => {
                    let mode = self.keyword_mode.unwrap_or_default();
                    let field = self.keyword_field.clone().unwrap_or_else(|| DEFAULT_KEYWORD_FIELD.to_string());
                    obj.insert("search_type".into(), Value::String(mode.as_str().to_string()));
                    obj.insert("field".into(), Value::String(field));
                    obj.insert("value".into(), Value::String(self.query_text.clone()));
                }
                SearchKind::Semantic => {
                    obj.insert("query".into(), Value::String(self.query_text.clone()));
                }
            }
        }
        body
    }

    pub fn generate_body(&self, session_id: &str, model_name: &str) -> GenerateRequest {
        GenerateRequest {
            query: self.query_text.clone(),
            k: self.result_limit,
            session_id: session_id.to_string(),
            asset_types: self.selected_asset_type_names.clone(),
            model_name: model_name.to_string(),
        }
    }
}

/// Body of `POST /querylog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryLogEntry {
    pub token: String,
    #[serde(rename = "queryType")]
    pub query_type: String,
    pub query: String,
}

impl QueryLogEntry {
    /// `None` when any part is empty; such entries are never sent.
    pub fn new(token: &str, query_type: &str, query: &str) -> Option<Self> {
        if token.is_empty() || query_type.is_empty() || query.is_empty() { return None; }
        Some(Self { token: token.to_string(), query_type: query_type.to_string(), query: query.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetType;

    fn registry() -> AssetTypeRegistry {
        AssetTypeRegistry::from_feed(vec![
            AssetType::new("doc", "Text", true),
            AssetType::new("img", "Media", false),
        ])
    }

    #[test]
    fn semantic_body_contains_only_displayed_types() {
        let Submission::Ready(req) = build_search_request(&QueryInput::new("hello", 10), &registry()) else {
            panic!("expected a ready request");
        };
        assert_eq!(req.search_body(), json!({"k": 10, "asset_types": ["doc"], "query": "hello"}));
    }

    #[test]
    fn keyword_body_uses_trimmed_value() {
        let input = QueryInput::new("  gpu cgroups ", 3).keyword("text", KeywordMode::Exact);
        let Submission::Ready(req) = build_search_request(&input, &registry()) else {
            panic!("expected a ready request");
        };
        assert_eq!(
            req.search_body(),
            json!({"k": 3, "asset_types": ["doc"], "search_type": "exact", "field": "text", "value": "gpu cgroups"})
        );
    }

    #[test]
    fn early_exits() {
        assert_eq!(build_search_request(&QueryInput::new("   ", 5), &registry()), Submission::EmptyQuery);
        let mut none = registry();
        none.toggle_group(Some("Text"));
        assert_eq!(build_search_request(&QueryInput::new("q", 5), &none), Submission::NoAssetTypes);
    }

    #[test]
    fn query_log_requires_all_parts() {
        assert!(QueryLogEntry::new("", "text", "q").is_none());
        let entry = QueryLogEntry::new("tok", "text", "q").unwrap();
        assert_eq!(serde_json::to_value(&entry).unwrap()["queryType"], "text");
    }
}
