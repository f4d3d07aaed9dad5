//! Domain and wire types shared by the pipeline and its front ends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

fn default_display_sort_order() -> i64 {
    1_000_000
}

/// A selectable category of indexed content.
///
/// - `name`: unique key sent to the backend
/// - `group`/`group_sort_order`: checkbox grouping, already sorted by the feed
/// - `display_default`: server default for `display`
/// - `display`: whether the type is currently selected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetType {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub group_sort_order: i64,
    #[serde(default)]
    pub display_title: String,
    #[serde(default = "default_display_sort_order")]
    pub display_sort_order: i64,
    #[serde(default)]
    pub display_default: bool,
    #[serde(default)]
    pub display: bool,
}

impl AssetType {
    pub fn new(name: impl Into<String>, group: impl Into<String>, display: bool) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            group_sort_order: 0,
            display_title: String::new(),
            display_sort_order: default_display_sort_order(),
            display_default: display,
            display,
        }
    }
}

/// A contiguous run of asset types sharing a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTypeGroup<'a> {
    pub group: &'a str,
    pub group_sort_order: i64,
    pub members: Vec<&'a AssetType>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Semantic,
    Keyword,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Semantic => "semantic",
            SearchKind::Keyword => "keyword",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(SearchKind::Semantic),
            "keyword" => Ok(SearchKind::Keyword),
            other => Err(Error::InvalidConfig(format!("unknown search kind '{other}'"))),
        }
    }
}

/// Matching strategy for keyword searches, as accepted by the router.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMode {
    #[default]
    Union,
    Exact,
    Fuzzy,
    Wildcard,
}

impl KeywordMode {
    pub fn as_str(self) -> &'static str {
        match self {
            KeywordMode::Union => "union",
            KeywordMode::Exact => "exact",
            KeywordMode::Fuzzy => "fuzzy",
            KeywordMode::Wildcard => "wildcard",
        }
    }
}

impl fmt::Display for KeywordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeywordMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(KeywordMode::Union),
            "exact" => Ok(KeywordMode::Exact),
            "fuzzy" => Ok(KeywordMode::Fuzzy),
            "wildcard" => Ok(KeywordMode::Wildcard),
            other => Err(Error::InvalidConfig(format!("unknown keyword mode '{other}'"))),
        }
    }
}

/// One submission, built fresh from the current query input and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query_text: String,
    pub result_limit: u32,
    pub selected_asset_type_names: Vec<String>,
    pub search_kind: SearchKind,
    pub keyword_field: Option<String>,
    pub keyword_mode: Option<KeywordMode>,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerateRequest {
    pub query: String,
    pub k: u32,
    pub session_id: String,
    pub asset_types: Vec<String>,
    pub model_name: String,
}

/// A single search hit. Backend fields are kept verbatim except the heading
/// and paragraph index fields, which normalization rewrites in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ResultItem {
    pub fields: Map<String, Value>,
}

pub const HEADING_INDEX_FIELD: &str = "heading_section_index";
pub const HEADING_TITLE_FIELD: &str = "heading_section_title";
pub const PARAGRAPH_INDEX_FIELD: &str = "paragraph_index";

impl ResultItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Stand-in item shown when a generation submission fails.
    pub fn error_placeholder() -> Self {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String("Error".to_string()));
        fields.insert("blurb".to_string(), Value::String("Error".to_string()));
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn text(&self) -> Option<&str> {
        self.str_field("text")
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("document_title").or_else(|| self.str_field("title"))
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("document_url")
    }

    /// Deduplicated, comma-joined heading indices.
    pub fn heading_path(&self) -> Option<&str> {
        self.str_field(HEADING_INDEX_FIELD)
    }

    /// Heading titles aligned with `heading_path`.
    pub fn heading_titles(&self) -> Option<&str> {
        self.str_field(HEADING_TITLE_FIELD)
    }

    pub fn paragraph_path(&self) -> Option<&str> {
        self.str_field(PARAGRAPH_INDEX_FIELD)
    }
}

/// Results belonging to one asset type within a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBucket {
    pub asset_type: String,
    pub display_title: String,
    pub items: Vec<ResultItem>,
    pub visible: bool,
}

/// Ordered buckets of the latest settled submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    buckets: Vec<ResultBucket>,
}

impl ResultSet {
    /// Every bucket starts visible.
    pub fn from_buckets(mut buckets: Vec<ResultBucket>) -> Self {
        for b in &mut buckets { b.visible = true; }
        Self { buckets }
    }

    pub fn error_placeholder() -> Self {
        Self::from_buckets(vec![ResultBucket {
            asset_type: String::new(),
            display_title: String::new(),
            items: vec![ResultItem::error_placeholder()],
            visible: true,
        }])
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn buckets(&self) -> &[ResultBucket] {
        &self.buckets
    }

    pub fn get(&self, index: usize) -> Option<&ResultBucket> {
        self.buckets.get(index)
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut [ResultBucket] {
        &mut self.buckets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultBucket> {
        self.buckets.iter()
    }

    pub fn total_items(&self) -> usize {
        self.buckets.iter().map(|b| b.items.len()).sum()
    }
}

/// One element of the `/search/*` response array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawBucket {
    pub asset_type: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub results: Vec<Map<String, Value>>,
}

/// Column-oriented results as carried by the stream greeting and by the
/// `search` member of a generation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "LegacyResultsWire")]
pub struct LegacyResults {
    pub results: Vec<Vec<Map<String, Value>>>,
    pub asset_types: Vec<String>,
    pub display_titles: Vec<String>,
}

/// Accepts both the current column names and the `response_*` ones; a
/// non-empty current column wins when a payload carries both.
#[derive(Deserialize)]
struct LegacyResultsWire {
    #[serde(default)]
    results: Vec<Vec<Map<String, Value>>>,
    #[serde(default)]
    asset_types: Vec<String>,
    #[serde(default)]
    response_asset_types: Vec<String>,
    #[serde(default)]
    display_titles: Vec<String>,
    #[serde(default)]
    response_display_titles: Vec<String>,
}

impl From<LegacyResultsWire> for LegacyResults {
    fn from(wire: LegacyResultsWire) -> Self {
        let prefer = |current: Vec<String>, legacy: Vec<String>| if current.is_empty() { legacy } else { current };
        Self {
            results: wire.results,
            asset_types: prefer(wire.asset_types, wire.response_asset_types),
            display_titles: prefer(wire.display_titles, wire.response_display_titles),
        }
    }
}

impl LegacyResults {
    /// Rows follow `results`; a short `asset_types` or `display_titles`
    /// column yields empty labels rather than dropping results.
    pub fn into_raw_buckets(self) -> Vec<RawBucket> {
        let LegacyResults { results, asset_types, display_titles } = self;
        results
            .into_iter()
            .enumerate()
            .map(|(i, rows)| RawBucket {
                asset_type: asset_types.get(i).cloned().unwrap_or_default(),
                display_title: display_titles.get(i).cloned().unwrap_or_default(),
                results: rows,
            })
            .collect()
    }
}

/// Body of a successful `POST /generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    #[serde(default)]
    pub generation: String,
    #[serde(default)]
    pub search: Option<LegacyResults>,
}
