// src/ingest/extract.rs
//! Text extraction helpers shared by the adapters: article body extraction,
//! inline text normalization, and best-effort timestamp parsing.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

/// Content regions tried in order before falling back to paragraphs.
const CONTENT_SELECTORS: &[&str] = &[
    "div.content",
    "div.article-content",
    "div.news-content",
    "div.main-content",
    "article",
    ".article-body",
    ".content-body",
];

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"))
}

/// Char-boundary safe truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Normalize inline markup (feed descriptions): decode entities, strip tags,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags().replace_all(&decoded, " ");
    truncate_chars(&collapse_whitespace(&stripped), max_chars)
}

/// Visible text under `el`, skipping script/style content.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

/// Extract the article text of a page: first matching content region, else
/// every `<p>` joined by newlines. Whitespace is collapsed and the result is
/// capped at `max_chars`.
pub fn extract_article_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);

    let mut content = String::new();
    for sel in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            content = visible_text(el);
            if !content.trim().is_empty() {
                break;
            }
        }
    }

    if content.trim().is_empty() {
        if let Ok(p) = Selector::parse("p") {
            content = doc
                .select(&p)
                .map(visible_text)
                .collect::<Vec<_>>()
                .join("\n");
        }
    }

    truncate_chars(&collapse_whitespace(&content), max_chars)
}

#[derive(Clone, Copy)]
enum TimeFormat {
    DateTime(&'static str),
    Date(&'static str),
    /// Parsed with the current year prepended.
    YearlessDateTime(&'static str),
    YearlessDate(&'static str),
}

/// Listing-page formats, tried in order.
const LISTING_FORMATS: &[TimeFormat] = &[
    TimeFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    TimeFormat::DateTime("%Y-%m-%d %H:%M"),
    TimeFormat::Date("%Y-%m-%d"),
    TimeFormat::YearlessDateTime("%m-%d %H:%M"),
    TimeFormat::Date("%Y年%m月%d日"),
    TimeFormat::YearlessDate("%m月%d日"),
];

fn parse_local(s: &str, year: i32) -> Option<NaiveDateTime> {
    LISTING_FORMATS.iter().find_map(|f| match *f {
        TimeFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(s, fmt).ok(),
        TimeFormat::Date(fmt) => NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        TimeFormat::YearlessDateTime(fmt) => {
            NaiveDateTime::parse_from_str(&format!("{year}|{s}"), &format!("%Y|{fmt}")).ok()
        }
        TimeFormat::YearlessDate(fmt) => {
            NaiveDate::parse_from_str(&format!("{year}|{s}"), &format!("%Y|{fmt}"))
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    })
}

fn parse_feed_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
}

/// Parse a publish timestamp. Listing formats are read as wall-clock time in
/// `offset`; feed formats (RFC 3339 / RFC 2822) carry their own zone.
/// Returns `None` when nothing matches; callers default to "now".
pub fn parse_publish_time(raw: &str, offset: FixedOffset, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let year = now.with_timezone(&offset).year();
    if let Some(naive) = parse_local(s, year) {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc));
    }
    parse_feed_timestamp(s)
}

/// `parse_publish_time`, falling back to `now`.
pub fn publish_time_or_now(raw: Option<&str>, offset: FixedOffset, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| parse_publish_time(s, offset, now))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap()
    }

    #[test]
    fn content_region_wins_over_paragraphs() {
        let html = r#"<html><body>
            <p>nav junk</p>
            <div class="article-content"><script>var x=1;</script><p>央行  宣布
            降准</p><style>.a{}</style></div>
        </body></html>"#;
        assert_eq!(extract_article_text(html, 5_000), "央行 宣布 降准");
    }

    #[test]
    fn falls_back_to_paragraphs() {
        let html = "<html><body><p>第一段</p><div><p>第二段</p></div></body></html>";
        assert_eq!(extract_article_text(html, 5_000), "第一段 第二段");
    }

    #[test]
    fn body_is_capped() {
        let long = "字".repeat(6_000);
        let html = format!("<article>{long}</article>");
        assert_eq!(extract_article_text(&html, 5_000).chars().count(), 5_000);
    }

    #[test]
    fn normalize_strips_markup_and_entities() {
        assert_eq!(
            normalize_text("<b>Hello&nbsp;&nbsp;world</b>\n ok", 100),
            "Hello world ok"
        );
    }

    #[test]
    fn listing_formats_in_market_time() {
        let t = parse_publish_time("2025-03-09 15:30", cst(), now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap());

        let d = parse_publish_time("2025年03月08日", cst(), now()).unwrap();
        assert_eq!(d, Utc.with_ymd_and_hms(2025, 3, 7, 16, 0, 0).unwrap());
    }

    #[test]
    fn yearless_formats_take_current_year() {
        let t = parse_publish_time("03-09 09:15", cst(), now()).unwrap();
        assert_eq!(t.year(), 2025);
        assert_eq!(t.hour(), 1);

        let d = parse_publish_time("3月9日", cst(), now()).unwrap();
        assert_eq!(d, Utc.with_ymd_and_hms(2025, 3, 8, 16, 0, 0).unwrap());
    }

    #[test]
    fn feed_formats_parse() {
        let t = parse_publish_time("Mon, 10 Mar 2025 02:00:00 +0000", cst(), now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap());
        let t = parse_publish_time("2025-03-10T02:00:00Z", cst(), now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn unparseable_defaults_to_now() {
        assert_eq!(publish_time_or_now(Some("昨天"), cst(), now()), now());
        assert_eq!(publish_time_or_now(None, cst(), now()), now());
    }
}
