//! The "otherwise" branch of `selectTemplate` (spec.md §4.5): additive
//! scoring used whenever no embedding classifier is ready (or none is
//! confident enough). Each active template accumulates points from five
//! independent signals; the highest total wins, ties broken by the
//! template's position in the candidate list (its DB insertion order).

use entity::prompt_template;
use lib_mail::CanonicalMessage;
use once_cell::sync::Lazy;
use regex::Regex;

const SENDER_DOMAIN_WEIGHT: f32 = 3.0;
const SUBJECT_PATTERN_WEIGHT: f32 = 2.5;
const CONTENT_STRUCTURE_WEIGHT: f32 = 1.5;
const KEYWORD_WEIGHT: f32 = 1.0;
const NAME_OVERLAP_WEIGHT: f32 = 0.5;
const MIN_OVERLAP_WORD_LEN: usize = 4;

static CURRENCY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[$€£]\s?\d+(\.\d{2})?|\d+(\.\d{2})?\s?(usd|eur|gbp)").unwrap());
static TIME_OF_DAY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d{1,2}(:\d{2})?\s?(am|pm)\b").unwrap());

/// Sender-domain → keyword hints a template name implies (exact domain or
/// subdomain match against the sender's address).
fn sender_domain_hint(from_address: &str, template_name: &str) -> f32 {
    let Some(domain) = from_address.rsplit_once('@').map(|(_, d)| d.to_lowercase()) else {
        return 0.0;
    };
    let name = template_name.to_lowercase();
    let domain_root = domain.split('.').next().unwrap_or(&domain);
    if name.contains(domain_root) {
        SENDER_DOMAIN_WEIGHT
    } else {
        0.0
    }
}

fn subject_pattern_score(subject: &str, template: &prompt_template::Model) -> f32 {
    let subject_lower = subject.to_lowercase();
    let mut score = 0.0;
    for keyword in template_keywords(template) {
        if subject_lower.contains(&keyword) {
            score += SUBJECT_PATTERN_WEIGHT;
        }
    }
    score
}

fn content_structure_score(body: &str, template: &prompt_template::Model) -> f32 {
    let name = template.name.to_lowercase();
    let mut score = 0.0;
    if (name.contains("invoice") || name.contains("receipt") || name.contains("payment"))
        && CURRENCY_PATTERN.is_match(body)
    {
        score += CONTENT_STRUCTURE_WEIGHT;
    }
    if (name.contains("appointment") || name.contains("meeting") || name.contains("schedule"))
        && TIME_OF_DAY_PATTERN.is_match(body)
    {
        score += CONTENT_STRUCTURE_WEIGHT;
    }
    score
}

fn keyword_score(haystack: &str, template: &prompt_template::Model) -> f32 {
    let haystack = haystack.to_lowercase();
    template_keywords(template)
        .iter()
        .map(|kw| haystack.matches(kw.as_str()).count() as f32 * KEYWORD_WEIGHT)
        .sum()
}

/// Template-name word overlap with the email text, words of at least
/// [`MIN_OVERLAP_WORD_LEN`] characters only.
fn name_overlap_score(haystack: &str, template: &prompt_template::Model) -> f32 {
    let haystack_words: Vec<String> = haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_OVERLAP_WORD_LEN)
        .map(|w| w.to_lowercase())
        .collect();

    template
        .name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_OVERLAP_WORD_LEN)
        .map(|w| w.to_lowercase())
        .filter(|w| haystack_words.contains(w))
        .count() as f32
        * NAME_OVERLAP_WEIGHT
}

/// Derives a small keyword set from the template's categories, used by both
/// the subject-pattern and keyword-frequency signals.
fn template_keywords(template: &prompt_template::Model) -> Vec<String> {
    let categories = template
        .categories
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_lowercase().replace('_', " ")))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    categories
}

fn score_template(email: &CanonicalMessage, template: &prompt_template::Model) -> f32 {
    let subject = email.subject.as_deref().unwrap_or_default();
    let body = email
        .body_text
        .as_deref()
        .or(email.body_html.as_deref())
        .unwrap_or_default();
    let combined = format!("{subject} {body}");

    sender_domain_hint(&email.from, &template.name)
        + subject_pattern_score(subject, template)
        + content_structure_score(body, template)
        + keyword_score(&combined, template)
        + name_overlap_score(&combined, template)
}

/// Returns the highest-scored active template; ties keep the first
/// candidate in insertion order.
pub fn highest_scored<'a>(
    email: &CanonicalMessage,
    candidates: &'a [prompt_template::Model],
) -> Option<&'a prompt_template::Model> {
    candidates
        .iter()
        .filter(|t| t.is_active)
        .map(|t| (score_template(email, t), t))
        .fold(None::<(f32, &prompt_template::Model)>, |best, (score, t)| {
            match best {
                Some((best_score, _)) if best_score >= score => best,
                _ => Some((score, t)),
            }
        })
        .map(|(_, t)| t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn template(id: i32, name: &str, categories: Vec<&str>) -> prompt_template::Model {
        prompt_template::Model {
            id,
            name: name.to_string(),
            description: String::new(),
            categories: json!(categories),
            template: "{{subject}}".to_string(),
            expected_output_schema: json!({}),
            version: 1,
            is_active: true,
        }
    }

    fn message(subject: &str, from: &str, body: &str) -> CanonicalMessage {
        CanonicalMessage {
            uid: 1,
            message_id: "m1".to_string(),
            subject: Some(subject.to_string()),
            from: from.to_string(),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body_text: Some(body.to_string()),
            body_html: None,
            flags: vec![],
        }
    }

    #[test]
    fn invoice_template_wins_on_currency_and_keyword() {
        let invoice = template(1, "invoice_analysis", vec!["INVOICE"]);
        let general = template(2, "general_analysis", vec!["PERSONAL"]);
        let email = message("Invoice #4921 due", "billing@acme.com", "Amount due: $249.00");
        let winner = highest_scored(&email, &[general, invoice]).unwrap();
        assert_eq!(winner.name, "invoice_analysis");
    }

    #[test]
    fn ties_prefer_first_candidate() {
        let a = template(1, "alpha", vec![]);
        let b = template(2, "beta", vec![]);
        let email = message("nothing relevant", "x@y.com", "plain body");
        let winner = highest_scored(&email, &[a, b]).unwrap();
        assert_eq!(winner.name, "alpha");
    }
}
