// src/ingest/providers/rss.rs
//! Generic RSS 2.0 feed adapter. Used for any source without a dedicated
//! adapter; the source URL is the feed URL.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::FetchError;
use crate::ingest::extract::parse_publish_time;
use crate::ingest::http::HttpFetcher;
use crate::ingest::types::{RawBody, RawDocument, SourceAdapter};
use crate::model::Source;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// quick-xml only knows the XML built-in entities.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\u{201C}")
        .replace("&rdquo;", "\u{201D}")
        .replace("&lsquo;", "\u{2018}")
        .replace("&rsquo;", "\u{2019}")
}

/// Parse a feed document. Entries without a link are dropped since the link
/// is the document identity.
pub fn parse_feed(
    xml: &str,
    offset: FixedOffset,
) -> Result<Vec<RawDocument>, quick_xml::de::DeError> {
    let t0 = std::time::Instant::now();
    let rss: Rss = from_str(&scrub_html_entities_for_xml(xml))?;
    let now = Utc::now();

    let out: Vec<RawDocument> = rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let url = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
            Some(RawDocument {
                title: it.title.unwrap_or_default().trim().to_string(),
                url,
                body: RawBody::Inline(it.description.unwrap_or_default()),
                published_at: it
                    .pub_date
                    .as_deref()
                    .and_then(|s| parse_publish_time(s, offset, now)),
            })
        })
        .collect();

    histogram!("ingest_parse_ms", "adapter" => "rss").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

pub struct RssAdapter {
    fetcher: HttpFetcher,
    offset: FixedOffset,
}

impl RssAdapter {
    pub fn new(fetcher: HttpFetcher, offset: FixedOffset) -> Self {
        Self { fetcher, offset }
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawDocument>, FetchError> {
        let body = self.fetcher.get_text(&source.url).await?;
        parse_feed(&body, self.offset).map_err(|e| FetchError::Markup {
            url: source.url.clone(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>t</title>
  <item>
    <title>央行宣布降准0.5个百分点</title>
    <link>https://news.example.cn/a/1</link>
    <pubDate>Mon, 10 Mar 2025 02:00:00 +0000</pubDate>
    <description>&lt;p&gt;释放长期资金&lt;/p&gt;&nbsp;约1万亿元</description>
  </item>
  <item>
    <title>no link</title>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_drops_linkless() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let docs = parse_feed(FEED, cst).unwrap();
        assert_eq!(docs.len(), 1);
        let d = &docs[0];
        assert_eq!(d.title, "央行宣布降准0.5个百分点");
        assert_eq!(d.url, "https://news.example.cn/a/1");
        assert_eq!(
            d.published_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap())
        );
        match &d.body {
            RawBody::Inline(s) => assert!(s.contains("释放长期资金")),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_error() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        assert!(parse_feed("<html>not a feed", cst).is_err());
    }
}
