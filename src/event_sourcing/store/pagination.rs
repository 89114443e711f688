use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_sourcing::core::{
    ListAggregateIdsOptions, ListAggregateIdsOutput, Result, StoreError,
};

// ============================================================================
// Aggregate Index & Pagination
// ============================================================================
//
// Aggregates are listed by the timestamp of their lowest-version event. The
// order is total: (initial timestamp, aggregate id), flipped as a whole when
// `reverse` is set, so the same filter always yields the same pages.
//
// The page token carries the whole filter plus the last id handed out. It is
// JSON, base64url encoded; callers only ever pass it back unchanged.
//
// ============================================================================

/// One row of the derived aggregate index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateIndexEntry {
    pub aggregate_id: String,
    pub initial_event_timestamp: DateTime<Utc>,
}

/// Decoded pagination cursor.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_event_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_event_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<String>,
}

impl PageToken {
    /// Filter taken straight from the caller's options, no resume point.
    pub fn from_options(options: &ListAggregateIdsOptions) -> Self {
        Self {
            limit: options.limit,
            initial_event_after: options.initial_event_after,
            initial_event_before: options.initial_event_before,
            reverse: options.reverse,
            last_evaluated_key: None,
        }
    }

    /// Active filter: the decoded token if one was passed, the options otherwise.
    pub fn resolve(options: &ListAggregateIdsOptions) -> Result<Self> {
        match options.page_token.as_deref() {
            Some(token) => Self::decode(token),
            None => Ok(Self::from_options(options)),
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| StoreError::InvalidPageToken(format!("cannot serialize cursor: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| StoreError::InvalidPageToken(format!("not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::InvalidPageToken(format!("malformed cursor: {}", e)))
    }

    /// Both bounds are inclusive.
    fn admits(&self, timestamp: DateTime<Utc>) -> bool {
        self.initial_event_after.map_or(true, |after| timestamp >= after)
            && self.initial_event_before.map_or(true, |before| timestamp <= before)
    }
}

/// Filter, order and cut one page out of the aggregate index.
pub fn paginate(
    mut index: Vec<AggregateIndexEntry>,
    options: &ListAggregateIdsOptions,
) -> Result<ListAggregateIdsOutput> {
    let filter = PageToken::resolve(options)?;

    index.retain(|entry| filter.admits(entry.initial_event_timestamp));
    index.sort_by(|a, b| {
        a.initial_event_timestamp
            .cmp(&b.initial_event_timestamp)
            .then_with(|| a.aggregate_id.cmp(&b.aggregate_id))
    });
    if filter.reverse {
        index.reverse();
    }

    // A resume key that no longer exists (e.g. rolled back) restarts the listing.
    let start = filter
        .last_evaluated_key
        .as_deref()
        .and_then(|key| index.iter().position(|entry| entry.aggregate_id == key))
        .map_or(0, |position| position + 1);

    let remaining = &index[start..];
    let page_len = filter.limit.map_or(remaining.len(), |limit| limit.min(remaining.len()));

    let aggregate_ids: Vec<String> = remaining[..page_len]
        .iter()
        .map(|entry| entry.aggregate_id.clone())
        .collect();

    let next_page_token = match aggregate_ids.last() {
        Some(last) if page_len < remaining.len() => Some(
            PageToken {
                last_evaluated_key: Some(last.clone()),
                ..filter
            }
            .encode()?,
        ),
        _ => None,
    };

    Ok(ListAggregateIdsOutput { aggregate_ids, next_page_token })
}
