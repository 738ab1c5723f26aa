//! Abstract embedding-based template classifier (spec.md §6). This is an
//! external collaborator per spec.md §1; the only implementation carried in
//! this core is a "never ready" default, which routes every `selectTemplate`
//! call to the scoring fallback in [`crate::template`].

use async_trait::async_trait;
use entity::sea_orm_active_enums::Category;

pub struct Classification {
    pub category: Category,
    pub confidence: f32,
}

#[async_trait]
pub trait EmbeddingClassifier: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn classify_subject(&self, subject: &str) -> Option<Classification>;
    fn get_category_template(&self, category: Category) -> Option<String>;
}

/// No embedding service wired in; `selectTemplate` always falls back to the
/// scoring heuristic.
pub struct UnavailableEmbeddingClassifier;

#[async_trait]
impl EmbeddingClassifier for UnavailableEmbeddingClassifier {
    fn is_ready(&self) -> bool {
        false
    }

    async fn classify_subject(&self, _subject: &str) -> Option<Classification> {
        None
    }

    fn get_category_template(&self, _category: Category) -> Option<String> {
        None
    }
}
