// src/ingest/providers/sina.rs
//! Sina Finance rolling news API (JSON). Bodies are fetched from the
//! article pages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::http::HttpFetcher;
use crate::ingest::types::{RawBody, RawDocument, SourceAdapter};
use crate::model::Source;

pub const ROLL_URL: &str =
    "https://feed.sina.com.cn/api/roll/get?pageid=153&lid=2516&k=&num=50&page=1";

#[derive(Debug, Default, Deserialize)]
struct Roll {
    #[serde(default)]
    result: Option<RollResult>,
}

#[derive(Debug, Default, Deserialize)]
struct RollResult {
    #[serde(default)]
    data: Vec<RollItem>,
}

#[derive(Debug, Deserialize)]
struct RollItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    /// Unix seconds, sent either as a string or a number.
    #[serde(default)]
    ctime: Value,
}

fn ctime_to_utc(v: &Value) -> Option<DateTime<Utc>> {
    let secs = match v {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Decode the roll API payload. A payload without `result.data` yields an
/// empty list rather than an error.
pub fn parse_roll(payload: Value) -> Result<Vec<RawDocument>, serde_json::Error> {
    let roll: Roll = serde_json::from_value(payload)?;
    Ok(roll
        .result
        .unwrap_or_default()
        .data
        .into_iter()
        .filter(|it| !it.url.trim().is_empty())
        .map(|it| {
            let url = it.url.trim().to_string();
            RawDocument {
                title: it.title.trim().to_string(),
                body: RawBody::Locator(url.clone()),
                published_at: ctime_to_utc(&it.ctime),
                url,
            }
        })
        .collect())
}

pub struct SinaRollAdapter {
    fetcher: HttpFetcher,
    url: String,
}

impl SinaRollAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            url: ROLL_URL.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for SinaRollAdapter {
    async fn fetch(&self, _source: &Source) -> Result<Vec<RawDocument>, FetchError> {
        let payload = self.fetcher.get_json(&self.url).await?;
        parse_roll(payload).map_err(|e| FetchError::Markup {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "sina_roll"
    }
}
