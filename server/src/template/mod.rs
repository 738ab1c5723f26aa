//! Prompt template catalog: selection (spec.md §4.5 step 1), rendering
//! (step 2), and response parsing (step 3).

pub mod parse;
pub mod render;
pub mod scoring;

use entity::prompt_template;
use entity::sea_orm_active_enums::LlmFocus;
use lib_mail::CanonicalMessage;

use crate::embedding::EmbeddingClassifier;

/// Picks the best prompt template for `email` out of `candidates`.
///
/// 1. If the embedding classifier is ready: use the template it maps the
///    predicted category to when confident (`confidence >= min_confidence`)
///    and that template exists among `candidates`; otherwise, if the
///    schedule carries an `llm_focus`, prefer the first active template
///    whose name mentions that focus.
/// 2. Otherwise (classifier not ready), go straight to the additive scoring
///    heuristic — the focus-based fallback only applies within the
///    classifier-ready branch.
///
/// Returns `None` only when `candidates` has no active templates at all.
pub async fn select_template<'a>(
    email: &CanonicalMessage,
    focus: Option<&LlmFocus>,
    classifier: &dyn EmbeddingClassifier,
    candidates: &'a [prompt_template::Model],
    min_confidence: f32,
) -> Option<&'a prompt_template::Model> {
    if classifier.is_ready() {
        if let Some(subject) = email.subject.as_deref() {
            if let Some(classification) = classifier.classify_subject(subject).await {
                if classification.confidence >= min_confidence {
                    if let Some(template_name) = classifier.get_category_template(classification.category) {
                        if let Some(found) = candidates
                            .iter()
                            .find(|t| t.is_active && t.name == template_name)
                        {
                            return Some(found);
                        }
                    }
                }
            }
        }

        if let Some(focus) = focus {
            let focus_word = match focus {
                LlmFocus::General => "general",
                LlmFocus::Sentiment => "sentiment",
                LlmFocus::Urgency => "urgency",
            };
            if let Some(found) = candidates
                .iter()
                .find(|t| t.is_active && t.name.to_lowercase().contains(focus_word))
            {
                return Some(found);
            }
        }
    }

    scoring::highest_scored(email, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Classification, UnavailableEmbeddingClassifier};
    use async_trait::async_trait;
    use chrono::Utc;
    use entity::sea_orm_active_enums::Category;
    use serde_json::json;

    fn template(id: i32, name: &str) -> prompt_template::Model {
        prompt_template::Model {
            id,
            name: name.to_string(),
            description: String::new(),
            categories: json!([]),
            template: "{{subject}}".to_string(),
            expected_output_schema: json!({}),
            version: 1,
            is_active: true,
        }
    }

    fn message(subject: &str) -> CanonicalMessage {
        CanonicalMessage {
            uid: 1,
            message_id: "m1".to_string(),
            subject: Some(subject.to_string()),
            from: "a@b.com".to_string(),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body_text: Some("body".to_string()),
            body_html: None,
            flags: vec![],
        }
    }

    struct ReadyClassifier {
        confidence: f32,
    }

    #[async_trait]
    impl EmbeddingClassifier for ReadyClassifier {
        fn is_ready(&self) -> bool {
            true
        }

        async fn classify_subject(&self, _subject: &str) -> Option<Classification> {
            Some(Classification {
                category: Category::Invoice,
                confidence: self.confidence,
            })
        }

        fn get_category_template(&self, category: Category) -> Option<String> {
            match category {
                Category::Invoice => Some("invoice_analysis".to_string()),
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn uses_classifier_template_when_confident() {
        let candidates = vec![template(1, "general_analysis"), template(2, "invoice_analysis")];
        let classifier = ReadyClassifier { confidence: 0.9 };
        let picked = select_template(&message("Invoice"), None, &classifier, &candidates, 0.7)
            .await
            .unwrap();
        assert_eq!(picked.name, "invoice_analysis");
    }

    #[tokio::test]
    async fn falls_back_to_focus_when_classifier_ready_but_not_confident() {
        let candidates = vec![template(1, "general_analysis"), template(2, "urgency_analysis")];
        let classifier = ReadyClassifier { confidence: 0.2 };
        let picked = select_template(
            &message("just a subject"),
            Some(&LlmFocus::Urgency),
            &classifier,
            &candidates,
            0.7,
        )
        .await
        .unwrap();
        assert_eq!(picked.name, "urgency_analysis");
    }

    #[tokio::test]
    async fn goes_straight_to_scoring_when_classifier_unavailable_even_with_focus_set() {
        // Spec step 2 says an unready classifier goes directly to the
        // scorer; the focus-name shortcut only applies inside the
        // classifier-ready branch.
        let candidates = vec![template(1, "general_analysis"), template(2, "urgency_analysis")];
        let classifier = UnavailableEmbeddingClassifier;
        let email = message("nothing urgency-related here");
        let picked = select_template(&email, Some(&LlmFocus::Urgency), &classifier, &candidates, 0.7)
            .await
            .unwrap();
        assert_eq!(
            picked.name,
            scoring::highest_scored(&email, &candidates).unwrap().name
        );
    }

    #[tokio::test]
    async fn falls_back_to_scoring_when_no_classifier_or_focus_match() {
        let candidates = vec![template(1, "alpha"), template(2, "beta")];
        let classifier = UnavailableEmbeddingClassifier;
        let picked = select_template(&message("nothing"), None, &classifier, &candidates, 0.7)
            .await
            .unwrap();
        assert_eq!(picked.name, "alpha");
    }
}
