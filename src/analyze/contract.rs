//! The analysis contract: prompt construction, lenient JSON extraction from
//! free-text model output, required-field check, and sanitization.

use serde_json::{Map, Value};

use crate::analyze::inference::Prompt;
use crate::error::ContractError;
use crate::ingest::extract::truncate_chars;
use crate::model::{is_instrument_code, Document};

/// Fields the model must return. Anything else in the object is ignored.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "sentiment_score",
    "sentiment_desc",
    "affected_sectors",
    "affected_concepts",
    "related_stocks",
    "time_range",
    "importance",
    "summary",
];

const SYSTEM_PROMPT: &str = "你是一个专业的A股市场分析师，擅长分析财经新闻对股市的影响。";

const ANALYSIS_TEMPLATE: &str = r#"请分析以下财经新闻，并按照JSON格式返回分析结果：

新闻内容：{content}

请从以下方面进行分析：
1. 利好/利空程度（1-10分，1为极度利空，10为极度利好）
2. 影响的板块和概念（如新能源、半导体、医药等）
3. 可能影响的核心个股代码（A股6位数字代码）
4. 影响时间范围（短期/中期/长期）
5. 重要性评级（1-5星）

返回JSON格式：
{
    "sentiment_score": 6,
    "sentiment_desc": "偏利好",
    "affected_sectors": ["新能源", "电池"],
    "affected_concepts": ["锂电池", "储能"],
    "related_stocks": ["300750", "002466"],
    "time_range": "中期",
    "importance": 4,
    "summary": "简要总结"
}"#;

/// Build the analysis prompt for a document. The body is cut at
/// `body_chars` characters.
pub fn build_prompt(doc: &Document, body_chars: usize, temperature: f32, max_tokens: u32) -> Prompt {
    let content = format!(
        "标题: {}\n\n内容: {}",
        doc.title,
        truncate_chars(&doc.body, body_chars)
    );
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user: ANALYSIS_TEMPLATE.replace("{content}", &content),
        temperature,
        max_tokens,
    }
}

/// Sanitized contract fields, ready to become a `Judgment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentDraft {
    pub sentiment_score: u8,
    pub sentiment_label: String,
    pub affected_sectors: Vec<String>,
    pub affected_concepts: Vec<String>,
    pub related_instruments: Vec<String>,
    pub time_horizon: String,
    pub importance: u8,
    pub summary: String,
}

/// Substring from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Result<&str, ContractError> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&text[start..=end]),
        _ => Err(ContractError::NoJsonObject),
    }
}

/// Decode free-text model output into a draft, or say why it was rejected.
pub fn decode_contract(text: &str) -> Result<JudgmentDraft, ContractError> {
    let slice = extract_json_object(text)?;
    let value: Value =
        serde_json::from_str(slice).map_err(|e| ContractError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ContractError::InvalidJson("top-level value is not an object".into()));
    };

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
        return Err(ContractError::MissingField(*missing));
    }

    Ok(JudgmentDraft {
        sentiment_score: clamp_u8(coerce_int(&obj, "sentiment_score")?, 1, 10),
        sentiment_label: coerce_text(&obj, "sentiment_desc")?,
        affected_sectors: clean_list(coerce_list(&obj, "affected_sectors")?),
        affected_concepts: clean_list(coerce_list(&obj, "affected_concepts")?),
        related_instruments: filter_instruments(coerce_list(&obj, "related_stocks")?),
        time_horizon: coerce_text(&obj, "time_range")?,
        importance: clamp_u8(coerce_int(&obj, "importance")?, 1, 5),
        summary: coerce_text(&obj, "summary")?,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ContractError> {
    obj.get(name).ok_or(ContractError::MissingField(name))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ContractError {
    ContractError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Integers, floats (truncated) and numeric strings are accepted.
fn coerce_int(obj: &Map<String, Value>, name: &'static str) -> Result<i64, ContractError> {
    let v = field(obj, name)?;
    let as_float = |f: f64| {
        if f.is_finite() {
            Ok(f.trunc() as i64)
        } else {
            Err(invalid(name, "not a finite number"))
        }
    };
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(i),
            None => as_float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(i),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| invalid(name, format!("{s:?} is not numeric")))
                    .and_then(as_float),
            }
        }
        other => Err(invalid(name, format!("expected a number, got {other}"))),
    }
}

fn clamp_u8(v: i64, lo: u8, hi: u8) -> u8 {
    v.clamp(i64::from(lo), i64::from(hi)) as u8
}

fn coerce_text(obj: &Map<String, Value>, name: &'static str) -> Result<String, ContractError> {
    match field(obj, name)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(name, format!("expected text, got {other}"))),
    }
}

/// Array entries that are strings or numbers, as strings. Other entries are
/// dropped; a non-array value is a contract error.
fn coerce_list(obj: &Map<String, Value>, name: &'static str) -> Result<Vec<String>, ContractError> {
    match field(obj, name)? {
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(invalid(name, format!("expected a list, got {other}"))),
    }
}

/// Trim entries and drop empty ones.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Keep six-digit codes only, first occurrence wins.
pub fn filter_instruments(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in clean_list(items) {
        if is_instrument_code(&code) && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(score: &str, importance: &str, stocks: &str) -> String {
        format!(
            r#"{{"sentiment_score": {score}, "sentiment_desc": "偏利好",
               "affected_sectors": [" 新能源 ", ""], "affected_concepts": ["锂电池"],
               "related_stocks": {stocks}, "time_range": "中期",
               "importance": {importance}, "summary": "简要总结"}}"#
        )
    }

    #[test]
    fn scores_are_clamped() {
        let d = decode_contract(&payload("15", "7", "[]")).unwrap();
        assert_eq!(d.sentiment_score, 10);
        assert_eq!(d.importance, 5);

        let d = decode_contract(&payload("-3", "0", "[]")).unwrap();
        assert_eq!(d.sentiment_score, 1);
        assert_eq!(d.importance, 1);
    }

    #[test]
    fn numeric_strings_and_floats_are_coerced() {
        let d = decode_contract(&payload("\"8\"", "3.9", "[]")).unwrap();
        assert_eq!(d.sentiment_score, 8);
        assert_eq!(d.importance, 3);
    }

    #[test]
    fn non_numeric_score_is_rejected() {
        let err = decode_contract(&payload("\"high\"", "3", "[]")).unwrap_err();
        assert!(matches!(
            err,
            ContractError::InvalidField {
                field: "sentiment_score",
                ..
            }
        ));
    }

    #[test]
    fn instruments_keep_six_digit_codes_only() {
        let d = decode_contract(&payload(
            "6",
            "4",
            r#"["300750","ABC123","12345","600519"]"#,
        ))
        .unwrap();
        assert_eq!(d.related_instruments, vec!["300750", "600519"]);
    }

    #[test]
    fn lists_are_trimmed() {
        let d = decode_contract(&payload("6", "4", "[]")).unwrap();
        assert_eq!(d.affected_sectors, vec!["新能源"]);
    }

    #[test]
    fn prose_around_the_object_is_tolerated() {
        let text = format!("分析如下：\n```json\n{}\n```\n以上。", payload("6", "4", "[]"));
        assert!(decode_contract(&text).is_ok());
    }

    #[test]
    fn missing_field_is_named() {
        let text = r#"{"sentiment_score": 6, "sentiment_desc": "x", "affected_sectors": [],
            "affected_concepts": [], "related_stocks": [], "time_range": "短期",
            "importance": 3}"#;
        assert_eq!(
            decode_contract(text).unwrap_err(),
            ContractError::MissingField("summary")
        );
    }

    #[test]
    fn no_object_and_bad_json() {
        assert_eq!(
            decode_contract("无法分析").unwrap_err(),
            ContractError::NoJsonObject
        );
        assert!(matches!(
            decode_contract("{not json}").unwrap_err(),
            ContractError::InvalidJson(_)
        ));
    }

    #[test]
    fn prompt_truncates_body() {
        let doc = Document {
            id: Default::default(),
            title: "标题".into(),
            body: "字".repeat(3_000),
            url: "u".into(),
            source_name: "s".into(),
            source_category: "news".into(),
            published_at: chrono::Utc::now(),
            ingested_at: chrono::Utc::now(),
            processed: false,
        };
        let p = build_prompt(&doc, 2_000, 0.1, 1_000);
        assert!(p.user.contains("标题: 标题"));
        assert_eq!(p.user.matches('字').count(), 2_000);
        assert!(!p.user.contains("{content}"));
    }
}
