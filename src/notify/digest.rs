//! Daily market digest: per-sector sentiment aggregation over the day's
//! important judgments, plus an optional model-written narrative.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyze::inference::{InferenceClient, Prompt};
use crate::error::InferenceError;
use crate::model::Judgment;

/// Summaries fed to the narrative prompt.
pub const NARRATIVE_INPUTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Mean score ≥ 6.5 is bullish, ≤ 4.5 bearish.
    pub fn from_mean(avg: f64) -> Self {
        if avg >= 6.5 {
            Trend::Bullish
        } else if avg <= 4.5 {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSentiment {
    pub sector: String,
    pub count: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub importance: u8,
    pub sentiment_score: u8,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDigest {
    pub generated_at: DateTime<Utc>,
    pub judgments: usize,
    /// Most covered sector first.
    pub sectors: Vec<SectorSentiment>,
    /// Most important first.
    pub highlights: Vec<Highlight>,
    pub narrative: Option<String>,
}

/// Deterministic part of the digest.
pub fn build_digest(judgments: &[Judgment], now: DateTime<Utc>) -> MarketDigest {
    let mut by_sector: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
    for j in judgments {
        for s in &j.affected_sectors {
            let e = by_sector.entry(s.as_str()).or_default();
            e.0 += 1;
            e.1 += u32::from(j.sentiment_score);
        }
    }
    let mut sectors: Vec<SectorSentiment> = by_sector
        .into_iter()
        .map(|(sector, (count, total))| {
            let avg = f64::from(total) / count as f64;
            SectorSentiment {
                sector: sector.to_string(),
                count,
                avg_score: (avg * 10.0).round() / 10.0,
                trend: Trend::from_mean(avg),
            }
        })
        .collect();
    // stable: ties keep sector name order
    sectors.sort_by(|a, b| b.count.cmp(&a.count));

    let mut ranked: Vec<&Judgment> = judgments.iter().collect();
    ranked.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then(b.created_at.cmp(&a.created_at))
    });
    let highlights = ranked
        .into_iter()
        .take(NARRATIVE_INPUTS)
        .map(|j| Highlight {
            importance: j.importance,
            sentiment_score: j.sentiment_score,
            summary: j.summary.clone(),
        })
        .collect();

    MarketDigest {
        generated_at: now,
        judgments: judgments.len(),
        sectors,
        highlights,
        narrative: None,
    }
}

pub fn narrative_prompt(digest: &MarketDigest) -> Prompt {
    let lines = digest
        .highlights
        .iter()
        .map(|h| format!("• 重要消息 - {}", h.summary))
        .collect::<Vec<_>>()
        .join("\n");
    Prompt {
        system: "你是专业的股市分析师，要生成简洁准确的市场总结。".to_string(),
        user: format!(
            "请根据以下重要财经新闻，生成一份简洁的A股市场今日总结（200字以内）：\n\n{lines}\n\n\
             总结要点：\n1. 主要利好/利空消息\n2. 受影响的重点板块\n3. 整体市场情绪\n4. 投资建议（谨慎表述）"
        ),
        temperature: 0.2,
        max_tokens: 500,
    }
}

/// Ask the model for a narrative. An empty digest needs none.
pub async fn write_narrative(
    client: &dyn InferenceClient,
    digest: &MarketDigest,
) -> Result<Option<String>, InferenceError> {
    if digest.highlights.is_empty() {
        return Ok(None);
    }
    let prompt = narrative_prompt(digest);
    Ok(Some(client.complete(&prompt).await?.trim().to_string()))
}
