//! Plain-text rendering of alerts and the daily digest.

use chrono::{DateTime, FixedOffset, Utc};

use crate::model::{Document, Judgment};
use crate::notify::digest::{MarketDigest, Trend};

/// Instruments listed by code before the list is abbreviated.
pub const INSTRUMENTS_SHOWN: usize = 8;

pub fn sentiment_icon(score: u8) -> &'static str {
    if score >= 7 {
        "📈"
    } else if score <= 4 {
        "📉"
    } else {
        "📊"
    }
}

pub fn importance_stars(importance: u8) -> String {
    "⭐".repeat(usize::from(importance))
}

/// First eight codes, then "等N只" with the total count.
pub fn format_instruments(codes: &[String]) -> String {
    if codes.is_empty() {
        return "暂无".to_string();
    }
    let shown = codes
        .iter()
        .take(INSTRUMENTS_SHOWN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if codes.len() > INSTRUMENTS_SHOWN {
        format!("{shown} 等{}只", codes.len())
    } else {
        shown
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "暂无".to_string()
    } else {
        items.join(", ")
    }
}

fn local_minute(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

/// Alert text for one judgment. `doc` is `None` when the source document
/// is no longer stored.
pub fn render_alert(doc: Option<&Document>, j: &Judgment, offset: FixedOffset) -> String {
    let stars = importance_stars(j.importance);
    let title = doc.map(|d| d.title.as_str()).unwrap_or("重要消息");
    let mut out = format!(
        "🚨 {stars} 市场重要消息 {stars}\n\n\
         {icon} {title}\n\n\
         📊 影响分析:\n\
         • 利好/利空评分: {score}/10 ({label})\n\
         • 影响时间: {horizon}\n\
         • 重要程度: {importance}/5星\n\n\
         🏭 影响板块: {sectors}\n\
         🏷️ 相关概念: {concepts}\n\n\
         📈 关注个股: {instruments}\n\n\
         💡 简要分析: {summary}\n",
        icon = sentiment_icon(j.sentiment_score),
        score = j.sentiment_score,
        label = j.sentiment_label,
        horizon = j.time_horizon,
        importance = j.importance,
        sectors = join_or_none(&j.affected_sectors),
        concepts = join_or_none(&j.affected_concepts),
        instruments = format_instruments(&j.related_instruments),
        summary = j.summary,
    );
    if let Some(d) = doc {
        out.push_str(&format!(
            "\n🕐 发布时间: {}\n🔗 原文链接: {}\n",
            local_minute(d.published_at, offset),
            d.url
        ));
    }
    out
}

fn trend_icon(t: Trend) -> &'static str {
    match t {
        Trend::Bullish => "📈",
        Trend::Bearish => "📉",
        Trend::Neutral => "📊",
    }
}

pub fn render_digest(digest: &MarketDigest, offset: FixedOffset) -> String {
    let mut out = String::from("📊 今日A股市场总结\n\n");

    if digest.highlights.is_empty() {
        out.push_str("今日暂无重要市场消息。\n");
    } else if let Some(n) = &digest.narrative {
        out.push_str(n.trim());
        out.push('\n');
    }

    if !digest.sectors.is_empty() {
        out.push_str("\n🏭 板块情绪:\n");
        for s in &digest.sectors {
            out.push_str(&format!(
                "• {}: {}条, 均分 {:.1} {}\n",
                s.sector,
                s.count,
                s.avg_score,
                trend_icon(s.trend)
            ));
        }
    }

    if !digest.highlights.is_empty() {
        out.push_str("\n📰 重要消息:\n");
        for h in &digest.highlights {
            out.push_str(&format!("• {} {}\n", importance_stars(h.importance), h.summary));
        }
    }

    out.push_str(&format!("\n🕐 {}\n", local_minute(digest.generated_at, offset)));
    out
}
