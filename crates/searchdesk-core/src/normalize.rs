//! Response normalization.
//!
//! The router stores list-valued chunk metadata as JSON-encoded strings, so a
//! chunk merged from several paragraphs carries e.g. `"[2, 2, 3]"` in
//! `heading_section_index`. Normalization decodes those lists, drops repeated
//! entries (first occurrence wins) and writes them back as `"2, 3"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{
    RawBucket, ResultBucket, ResultItem, ResultSet, HEADING_INDEX_FIELD, HEADING_TITLE_FIELD,
    PARAGRAPH_INDEX_FIELD,
};

/// Which list the paragraph index is re-joined from.
///
/// `Raw` keeps every decoded entry (duplicates included), which is what the
/// deployed client renders. `Deduplicated` matches the heading treatment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphJoin {
    #[default]
    Raw,
    Deduplicated,
}

/// Decode a server-encoded list. Plain JSON arrays are accepted as-is.
pub fn decode_list(field: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::String(encoded) => {
            serde_json::from_str::<Vec<Value>>(encoded).map_err(|e| Error::decode(field, e))
        }
        Value::Array(items) => Ok(items.clone()),
        other => Err(Error::decode(field, format!("expected an encoded list, got {other}"))),
    }
}

/// Comma-join list entries for display. Missing entries render empty.
pub fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Order-preserving dedup by value.
pub fn dedup_values(values: &[Value]) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(values.len());
    for v in values {
        if !unique.contains(v) { unique.push(v.clone()); }
    }
    unique
}

/// Walk `indices` and `titles` in lock-step keeping the first occurrence of
/// each index together with the title at the same position.
///
/// The two lists are expected to have equal length; a missing title becomes
/// `null`.
pub fn dedup_parallel(indices: &[Value], titles: &[Value]) -> (Vec<Value>, Vec<Value>) {
    let mut kept_indices: Vec<Value> = Vec::new();
    let mut kept_titles: Vec<Value> = Vec::new();
    for (k, index) in indices.iter().enumerate() {
        if kept_indices.contains(index) { continue; }
        kept_indices.push(index.clone());
        kept_titles.push(titles.get(k).cloned().unwrap_or(Value::Null));
    }
    (kept_indices, kept_titles)
}

fn present<'a>(item: &'a ResultItem, field: &str) -> Option<&'a Value> {
    item.fields.get(field).filter(|v| !v.is_null())
}

/// Rewrite the heading and paragraph fields of one item in place.
pub fn normalize_item(item: &mut ResultItem, paragraph_join: ParagraphJoin) -> Result<()> {
    if let (Some(raw_index), Some(raw_title)) =
        (present(item, HEADING_INDEX_FIELD), present(item, HEADING_TITLE_FIELD))
    {
        let indices = decode_list(HEADING_INDEX_FIELD, raw_index)?;
        let titles = decode_list(HEADING_TITLE_FIELD, raw_title)?;
        let (indices, titles) = dedup_parallel(&indices, &titles);
        item.fields.insert(HEADING_INDEX_FIELD.to_string(), Value::String(join_values(&indices)));
        item.fields.insert(HEADING_TITLE_FIELD.to_string(), Value::String(join_values(&titles)));
    }

    if let Some(raw_paragraph) = present(item, PARAGRAPH_INDEX_FIELD) {
        let decoded = decode_list(PARAGRAPH_INDEX_FIELD, raw_paragraph)?;
        let joined = match paragraph_join {
            ParagraphJoin::Raw => join_values(&decoded),
            ParagraphJoin::Deduplicated => join_values(&dedup_values(&decoded)),
        };
        item.fields.insert(PARAGRAPH_INDEX_FIELD.to_string(), Value::String(joined));
    }
    Ok(())
}

/// Normalize a whole response. The first malformed item aborts the lot.
pub fn normalize_buckets(raw: Vec<RawBucket>, paragraph_join: ParagraphJoin) -> Result<ResultSet> {
    let mut buckets = Vec::with_capacity(raw.len());
    for bucket in raw {
        let mut items = Vec::with_capacity(bucket.results.len());
        for fields in bucket.results {
            let mut item = ResultItem::new(fields);
            normalize_item(&mut item, paragraph_join)?;
            items.push(item);
        }
        buckets.push(ResultBucket {
            asset_type: bucket.asset_type,
            display_title: bucket.display_title,
            items,
            visible: true,
        });
    }
    Ok(ResultSet::from_buckets(buckets))
}
