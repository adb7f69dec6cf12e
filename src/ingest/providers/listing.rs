// src/ingest/providers/listing.rs
//! HTML listing-page adapter. Each preset names the listing URL, the element
//! that wraps one entry, and where the entry's date lives.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use metrics::histogram;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::error::FetchError;
use crate::ingest::extract::{collapse_whitespace, parse_publish_time};
use crate::ingest::http::HttpFetcher;
use crate::ingest::types::{RawBody, RawDocument, SourceAdapter};
use crate::model::{Source, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCell {
    /// First element matching the selector inside the entry.
    Selector(&'static str),
    /// Last `<td>` of a table row, when the row has more than one cell.
    LastCell,
}

#[derive(Debug, Clone, Copy)]
pub struct ListingPreset {
    pub list_url: &'static str,
    /// Base for resolving relative links.
    pub base_url: &'static str,
    pub entry: &'static str,
    pub date: DateCell,
}

impl ListingPreset {
    pub fn for_kind(kind: SourceKind) -> Option<Self> {
        let p = match kind {
            SourceKind::Cnstock => Self {
                list_url: "http://www.cnstock.com/v_news/sns_yw/index.html",
                base_url: "http://www.cnstock.com",
                entry: "div.news_item",
                date: DateCell::Selector("span.time"),
            },
            SourceKind::Csrc => Self {
                list_url: "http://www.csrc.gov.cn/newsite/zjhxwfb/",
                base_url: "http://www.csrc.gov.cn",
                entry: "li.news_item",
                date: DateCell::Selector("span.date"),
            },
            SourceKind::Sse => Self {
                list_url: "http://www.sse.com.cn/news/newslist/",
                base_url: "http://www.sse.com.cn",
                entry: "div.news-item",
                date: DateCell::Selector("span.time"),
            },
            SourceKind::Szse => Self {
                list_url: "http://www.szse.cn/news/index.html",
                base_url: "http://www.szse.cn",
                entry: "tr",
                date: DateCell::LastCell,
            },
            SourceKind::Stats => Self {
                list_url: "http://www.stats.gov.cn/tjsj/",
                base_url: "http://www.stats.gov.cn",
                entry: "li",
                date: DateCell::Selector("span"),
            },
            SourceKind::SinaFinance | SourceKind::Rss => return None,
        };
        Some(p)
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn date_text(entry: ElementRef<'_>, cell: DateCell) -> Option<String> {
    match cell {
        DateCell::Selector(sel) => {
            let sel = Selector::parse(sel).ok()?;
            entry.select(&sel).next().map(text_of)
        }
        DateCell::LastCell => {
            let td = Selector::parse("td").ok()?;
            let cells: Vec<_> = entry.select(&td).collect();
            if cells.len() > 1 {
                cells.last().map(|c| text_of(*c))
            } else {
                None
            }
        }
    }
}

/// Parse one listing page into raw documents. Entries without a link or a
/// title are skipped; relative links resolve against the preset base.
pub fn parse_listing(html: &str, preset: &ListingPreset, offset: FixedOffset) -> Vec<RawDocument> {
    let t0 = std::time::Instant::now();
    let doc = Html::parse_document(html);
    let (Ok(entry_sel), Ok(link_sel)) = (Selector::parse(preset.entry), Selector::parse("a")) else {
        return Vec::new();
    };
    let Ok(base) = Url::parse(preset.base_url) else {
        return Vec::new();
    };
    let now = Utc::now();

    let mut out = Vec::new();
    for entry in doc.select(&entry_sel) {
        let Some(link) = entry.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };
        let title = text_of(link);
        if title.is_empty() {
            continue;
        }
        let published_at = date_text(entry, preset.date)
            .and_then(|s| parse_publish_time(&s, offset, now));

        out.push(RawDocument {
            title,
            url: url.to_string(),
            body: RawBody::Locator(url.to_string()),
            published_at,
        });
    }

    histogram!("ingest_parse_ms", "adapter" => "listing").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

pub struct ListingAdapter {
    fetcher: HttpFetcher,
    preset: ListingPreset,
    offset: FixedOffset,
}

impl ListingAdapter {
    pub fn new(fetcher: HttpFetcher, preset: ListingPreset, offset: FixedOffset) -> Self {
        Self {
            fetcher,
            preset,
            offset,
        }
    }
}

#[async_trait]
impl SourceAdapter for ListingAdapter {
    async fn fetch(&self, _source: &Source) -> Result<Vec<RawDocument>, FetchError> {
        let html = self.fetcher.get_text(self.preset.list_url).await?;
        Ok(parse_listing(&html, &self.preset, self.offset))
    }

    fn name(&self) -> &'static str {
        "listing"
    }
}
