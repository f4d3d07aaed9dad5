//! Vote and correction records attributed to the resolved username.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::types::SearchKind;

/// Body of `POST /feedback` for an up/down vote on one result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub query: String,
    pub chunk_id: String,
    pub search_type: SearchKind,
    pub keyword_search_field: Option<String>,
    pub keyword_search_type: Option<String>,
    pub asset_type: String,
    pub k: u32,
    pub results_idx: usize,
    pub n_results: usize,
    pub vote_value: i32,
    pub username: String,
}

impl VoteRecord {
    /// Build a vote for result `result_index` of bucket `bucket_index`.
    pub fn for_result(state: &AppState, bucket_index: usize, result_index: usize, vote_value: i32) -> Result<Self> {
        let bucket = state
            .results
            .get(bucket_index)
            .ok_or_else(|| Error::NotFound(format!("result bucket {bucket_index}")))?;
        let item = bucket
            .items
            .get(result_index)
            .ok_or_else(|| Error::NotFound(format!("result {result_index} in bucket {bucket_index}")))?;
        let chunk_id = item
            .chunk_id()
            .ok_or_else(|| Error::NotFound(format!("chunk id of result {result_index}")))?;

        let input = &state.input;
        let keyword = input.search_kind == SearchKind::Keyword;
        Ok(Self {
            query: input.query.trim().to_string(),
            chunk_id: chunk_id.to_string(),
            search_type: input.search_kind,
            keyword_search_field: keyword.then(|| input.keyword.field.clone()),
            keyword_search_type: keyword.then(|| input.keyword.mode.as_str().to_string()),
            asset_type: bucket.asset_type.clone(),
            k: input.limit,
            results_idx: result_index,
            n_results: bucket.items.len(),
            vote_value,
            username: state.identity.username.clone(),
        })
    }
}

/// Body of `POST /feedback` for a free-text correction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrectionRecord {
    pub value: i32,
    pub original_text: String,
    pub summary_text: String,
    pub username: String,
    pub url: Option<String>,
}

impl CorrectionRecord {
    pub fn new(state: &AppState, original_text: &str, summary_text: &str, url: Option<&str>) -> Self {
        Self {
            value: 0,
            original_text: original_text.to_string(),
            summary_text: summary_text.to_string(),
            username: state.identity.username.clone(),
            url: url.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QueryInput;
    use crate::types::{KeywordMode, ResultBucket, ResultItem, ResultSet};
    use serde_json::json;

    fn state(input: QueryInput) -> AppState {
        let mut s = AppState::default();
        s.input = input;
        s.identity.username = "jdoe".into();
        let item = |id: &str| ResultItem::new(json!({ "id": id }).as_object().cloned().unwrap_or_default());
        s.replace_results(ResultSet::from_buckets(vec![ResultBucket {
            asset_type: "techblogs".into(),
            display_title: "TechBlog Posts".into(),
            items: vec![item("doc:1"), item("doc:2")],
            visible: true,
        }]));
        s
    }

    #[test]
    fn semantic_vote_omits_keyword_fields() {
        let vote = VoteRecord::for_result(&state(QueryInput::new(" cuda init ", 5)), 0, 1, 1).unwrap();
        let body = serde_json::to_value(&vote).unwrap();
        assert_eq!(body["query"], "cuda init");
        assert_eq!(body["chunk_id"], "doc:2");
        assert_eq!(body["search_type"], "semantic");
        assert!(body["keyword_search_field"].is_null());
        assert_eq!(body["n_results"], 2);
        assert_eq!(body["username"], "jdoe");
    }

    #[test]
    fn keyword_vote_carries_mode() {
        let input = QueryInput::new("cgroups", 10).keyword("content", KeywordMode::Wildcard);
        let vote = VoteRecord::for_result(&state(input), 0, 0, -1).unwrap();
        assert_eq!(vote.keyword_search_type.as_deref(), Some("wildcard"));
        assert_eq!(vote.vote_value, -1);
    }

    #[test]
    fn vote_on_missing_result_fails() {
        let s = state(QueryInput::new("q", 5));
        assert!(VoteRecord::for_result(&s, 1, 0, 1).is_err());
        assert!(VoteRecord::for_result(&s, 0, 9, 1).is_err());
    }
}
