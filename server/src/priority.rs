//! Sender/type priority overrides applied before the LLM call, and the
//! score-combination step applied to its output. Spec.md §4.6.

use entity::sea_orm_active_enums::{Category, Priority};
use serde_json::Value as Json;

/// Hints computed from the schedule's configured overrides, before the LLM
/// ever runs. `*_configured` flags distinguish "the user set an override
/// for this slot" from "no override matched", since an unmatched lookup and
/// an explicit `LOW` override both carry no hint or a zero boost.
#[derive(Debug, Clone, Default)]
pub struct PriorityHints {
    pub sender_priority: Option<Priority>,
    pub type_priority: Option<Priority>,
}

/// A crude keyword matcher used only to pick a *hint*, never persisted as
/// the final category — the LLM's own `category` supersedes it at step 6.
pub fn detect_category_advisory(subject: &str, body_text: &str) -> Category {
    let haystack = format!("{subject} {body_text}").to_lowercase();

    const SIGNALS: &[(Category, &[&str])] = &[
        (Category::Invoice, &["invoice", "amount due", "payment due"]),
        (Category::Receipt, &["receipt", "order confirmation", "thank you for your purchase"]),
        (Category::Appointment, &["appointment", "reservation", "meeting reminder", "calendar invite"]),
        (Category::Support, &["ticket", "support request", "case #"]),
        (Category::Notification, &["notification", "alert:", "has been updated"]),
        (Category::Newsletter, &["unsubscribe", "newsletter", "weekly digest"]),
        (Category::Marketing, &["% off", "limited time offer", "sale ends", "promo code"]),
        (Category::Work, &["standup", "sprint", "deadline", "project update"]),
    ];

    for (category, keywords) in SIGNALS {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *category;
        }
    }
    Category::Personal
}

fn lookup_sender_priority(sender_priorities: &Json, from_address: &str) -> Option<Priority> {
    let map = sender_priorities.as_object()?;
    if let Some(v) = map.get(from_address) {
        if let Ok(p) = serde_json::from_value::<Priority>(v.clone()) {
            return Some(p);
        }
    }
    let domain = from_address.rsplit_once('@').map(|(_, d)| d)?;
    map.get(domain)
        .and_then(|v| serde_json::from_value::<Priority>(v.clone()).ok())
}

fn lookup_type_priority(email_type_priorities: &Json, category: Category) -> Option<Priority> {
    let map = email_type_priorities.as_object()?;
    let category_key = serde_json::to_value(category)
        .ok()?
        .as_str()?
        .to_string();
    map.get(&category_key)
        .and_then(|v| serde_json::from_value::<Priority>(v.clone()).ok())
}

/// Pre-LLM hints: `senderPriorities[from] ?? senderPriorities[domain]`, and
/// `emailTypePriorities[detectedCategory]` from the lightweight matcher.
pub fn pre_llm_hints(
    sender_priorities: &Json,
    email_type_priorities: &Json,
    from_address: &str,
    subject: &str,
    body_text: &str,
) -> PriorityHints {
    let detected = detect_category_advisory(subject, body_text);
    PriorityHints {
        sender_priority: lookup_sender_priority(sender_priorities, from_address),
        type_priority: lookup_type_priority(email_type_priorities, detected),
    }
}

/// Result of the post-LLM score combination: the clamped final score and a
/// human-readable note naming which pre-LLM overrides were applied. The
/// LLM's own scoring breakdown is persisted verbatim in its own column
/// (spec.md §4.6); this reasoning covers only the override boosts, not a
/// restatement of the LLM's output.
pub struct PostLlmScore {
    pub importance_score: i32,
    pub reasoning: Option<String>,
}

/// Starting from the LLM's `importance_score` (or 50 if absent), adds the
/// boost for each hint that is set, clamping the final score to `[0, 100]`.
pub fn apply_post_llm_boosts(llm_importance_score: Option<i32>, hints: &PriorityHints) -> PostLlmScore {
    let mut score = llm_importance_score.unwrap_or(50);
    let mut suffixes = Vec::new();

    if let Some(p) = hints.sender_priority {
        let boost = p.score_boost();
        score += boost;
        suffixes.push(format!("[User override: +{boost} for sender priority]"));
    }
    if let Some(p) = hints.type_priority {
        let boost = p.score_boost();
        score += boost;
        suffixes.push(format!("[User override: +{boost} for type priority]"));
    }

    let score = score.clamp(0, 100);
    let reasoning = if suffixes.is_empty() { None } else { Some(suffixes.join(" ")) };

    PostLlmScore {
        importance_score: score,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sender_priority_exact_address_wins_over_domain() {
        let sender_priorities = json!({"boss@x.com": "URGENT", "x.com": "LOW"});
        let empty = json!({});
        let hints = pre_llm_hints(&sender_priorities, &empty, "boss@x.com", "", "");
        assert_eq!(hints.sender_priority, Some(Priority::Urgent));
    }

    #[test]
    fn sender_priority_falls_back_to_domain() {
        let sender_priorities = json!({"x.com": "HIGH"});
        let empty = json!({});
        let hints = pre_llm_hints(&sender_priorities, &empty, "someone@x.com", "", "");
        assert_eq!(hints.sender_priority, Some(Priority::High));
    }

    #[test]
    fn boss_urgent_sender_boosts_score_to_80() {
        let hints = PriorityHints {
            sender_priority: Some(Priority::Urgent),
            type_priority: None,
        };
        let result = apply_post_llm_boosts(Some(50), &hints);
        assert_eq!(result.importance_score, 80);
        assert!(result
            .reasoning
            .unwrap()
            .contains("[User override: +30 for sender priority]"));
    }

    #[test]
    fn missing_llm_score_defaults_to_50() {
        let hints = PriorityHints::default();
        let result = apply_post_llm_boosts(None, &hints);
        assert_eq!(result.importance_score, 50);
        assert_eq!(result.reasoning, None);
    }

    #[test]
    fn score_clamps_to_100() {
        let hints = PriorityHints {
            sender_priority: Some(Priority::Urgent),
            type_priority: Some(Priority::Urgent),
        };
        let result = apply_post_llm_boosts(Some(90), &hints);
        assert_eq!(result.importance_score, 100);
    }
}
