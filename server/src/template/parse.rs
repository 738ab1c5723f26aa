//! `parseAndValidate` (spec.md §4.5). The LLM is treated as best-effort:
//! any malformed, partial, or absent structure recovers to safe neutral
//! defaults rather than failing the message (spec.md §4.7 step 5).

use entity::sea_orm_active_enums::{ActionType, Category, EntityType, Priority, Sentiment};
use serde::Deserialize;
use serde_json::Value as Json;

pub struct ParsedEntity {
    pub entity_type: EntityType,
    pub entity_value: String,
    pub confidence: f32,
    pub context: Option<String>,
}

pub struct ParsedActionItem {
    pub action_type: ActionType,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub is_completed: bool,
}

pub struct Parsed {
    pub category: Category,
    pub priority: Priority,
    pub sentiment: Sentiment,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub confidence: f32,
    pub importance_score: Option<i32>,
    pub entities: Vec<ParsedEntity>,
    pub action_items: Vec<ParsedActionItem>,
    pub scoring_breakdown: Option<Json>,
    /// Set only when the *whole* response was unparseable (no JSON object
    /// found, or the object didn't deserialize at all) — as opposed to a
    /// structurally valid response that merely dropped one unknown enum
    /// value. The pipeline uses this to decide `COMPLETED` vs `FAILED`
    /// (spec.md §4.7 step 7 vs the data model's `FAILED` lifecycle).
    pub is_fallback: bool,
}

impl Parsed {
    /// Safe defaults for any parse failure mode (spec.md §4.7 step 5).
    pub fn fallback() -> Self {
        Parsed {
            category: Category::Personal,
            priority: Priority::Medium,
            sentiment: Sentiment::Neutral,
            summary: Some("Failed to parse LLM response".to_string()),
            tags: Vec::new(),
            confidence: 0.3,
            importance_score: None,
            entities: Vec::new(),
            action_items: Vec::new(),
            scoring_breakdown: None,
            is_fallback: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawEntity {
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    entity_value: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawActionItem {
    #[serde(default)]
    action_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    is_completed: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RawResponse {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    importance_score: Option<i32>,
    #[serde(default)]
    entities: Option<Vec<RawEntity>>,
    #[serde(default)]
    action_items: Option<Vec<RawActionItem>>,
    #[serde(default)]
    scoring_breakdown: Option<Json>,
}

/// Greedily extracts the first balanced top-level `{...}` object from
/// `raw`, tolerating surrounding prose (`"category: BOGUS... {json}"`-style
/// responses).
fn extract_first_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_enum_or_warn<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
    field_name: &str,
) -> Option<T> {
    let raw = raw?;
    let quoted = format!("\"{raw}\"");
    match serde_json::from_str::<T>(&quoted) {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("dropping unknown {field_name} value from LLM response: {raw}");
            None
        }
    }
}

/// Parses and validates a raw LLM response. Unknown enum values are
/// dropped (logged at WARN) and fall back to their neutral default;
/// `confidence` and `importance_score` are clamped; entities/action items
/// missing their key field are filtered out entirely.
pub fn parse_and_validate(raw: &str) -> Parsed {
    let Some(json_slice) = extract_first_json_object(raw) else {
        return Parsed::fallback();
    };

    let parsed: RawResponse = match serde_json::from_str(json_slice) {
        Ok(v) => v,
        Err(_) => return Parsed::fallback(),
    };

    let category =
        parse_enum_or_warn::<Category>(parsed.category.as_deref(), "category").unwrap_or_default();
    let priority = parse_enum_or_warn::<Priority>(parsed.priority.as_deref(), "priority")
        .unwrap_or(Priority::Medium);
    let sentiment = parse_enum_or_warn::<Sentiment>(parsed.sentiment.as_deref(), "sentiment")
        .unwrap_or_default();

    let confidence = parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let importance_score = parsed.importance_score.map(|s| s.clamp(0, 100));

    let entities = parsed
        .entities
        .unwrap_or_default()
        .into_iter()
        .filter_map(|e| {
            let entity_value = e.entity_value.filter(|v| !v.trim().is_empty())?;
            let entity_type = parse_enum_or_warn::<EntityType>(e.entity_type.as_deref(), "entity_type")?;
            Some(ParsedEntity {
                entity_type,
                entity_value,
                confidence: e.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                context: e.context,
            })
        })
        .collect();

    let action_items = parsed
        .action_items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| {
            let description = a.description.filter(|d| !d.trim().is_empty())?;
            let action_type =
                parse_enum_or_warn::<ActionType>(a.action_type.as_deref(), "action_type")?;
            let priority = parse_enum_or_warn::<Priority>(a.priority.as_deref(), "priority")
                .unwrap_or(Priority::Medium);
            let due_date = a
                .due_date
                .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
                .map(|d| d.with_timezone(&chrono::Utc));
            Some(ParsedActionItem {
                action_type,
                description,
                priority,
                due_date,
                is_completed: a.is_completed.unwrap_or(false),
            })
        })
        .collect();

    Parsed {
        category,
        priority,
        sentiment,
        summary: parsed.summary,
        tags: parsed.tags.unwrap_or_default(),
        confidence,
        importance_score,
        entities,
        action_items,
        scoring_breakdown: parsed.scoring_breakdown,
        is_fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let raw = r#"{"category":"WORK","priority":"HIGH","sentiment":"NEUTRAL","summary":"ok","confidence":0.9,"importance_score":70}"#;
        let parsed = parse_and_validate(raw);
        assert_eq!(parsed.category, Category::Work);
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.confidence, 0.9);
        assert_eq!(parsed.importance_score, Some(70));
    }

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let raw = r#"Sure thing! Here is the result: {"category":"PERSONAL","priority":"MEDIUM","sentiment":"POSITIVE","summary":"hi"} Hope that helps!"#;
        let parsed = parse_and_validate(raw);
        assert_eq!(parsed.category, Category::Personal);
        assert_eq!(parsed.summary.as_deref(), Some("hi"));
    }

    #[test]
    fn unknown_category_falls_back_to_default() {
        let raw = r#"{"category":"BOGUS","priority":"MEDIUM","sentiment":"POSITIVE","summary":"hi"}"#;
        let parsed = parse_and_validate(raw);
        assert_eq!(parsed.category, Category::Personal);
        assert_eq!(parsed.priority, Priority::Medium);
        assert_eq!(parsed.sentiment, Sentiment::Positive);
        assert_eq!(parsed.summary.as_deref(), Some("hi"));
    }

    #[test]
    fn no_json_object_returns_fallback() {
        let parsed = parse_and_validate("not json at all");
        assert_eq!(parsed.category, Category::Personal);
        assert_eq!(parsed.priority, Priority::Medium);
        assert_eq!(parsed.confidence, 0.3);
        assert_eq!(parsed.summary.as_deref(), Some("Failed to parse LLM response"));
    }

    #[test]
    fn clamps_confidence_and_importance_score() {
        let raw = r#"{"confidence": 1.8, "importance_score": 500}"#;
        let parsed = parse_and_validate(raw);
        assert_eq!(parsed.confidence, 1.0);
        assert_eq!(parsed.importance_score, Some(100));
    }

    #[test]
    fn filters_entities_missing_value() {
        let raw = r#"{"entities":[{"entity_type":"PERSON","entity_value":""},{"entity_type":"PERSON","entity_value":"Alice"}]}"#;
        let parsed = parse_and_validate(raw);
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].entity_value, "Alice");
    }
}
