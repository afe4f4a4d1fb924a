//! crates/studyforge_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::domain::{Course, Flashcard, MangaPanel, QuizQuestion, SourceContent};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network)
/// into the categories the rest of the application acts on.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The model returned no usable text at all.
    #[error("The model returned an empty response")]
    EmptyResponse,
    /// The model returned text, but it could not be coerced into the
    /// expected structure. Fail loudly rather than merge a partial result.
    #[error("The model response could not be parsed: {0}")]
    MalformedResponse(String),
    /// The remote endpoint is temporarily unable to serve (e.g. a hosted
    /// model still warming up). Retrying later is expected to succeed; the
    /// application never retries on its own.
    #[error("Service temporarily unavailable: {0}")]
    TransientUnavailable(String),
    /// The document or blob store could not complete the operation.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A save carried a stale version token; someone else wrote first.
    #[error("Version conflict on course {course_id}: expected to replace version {version}")]
    Conflict { course_id: Uuid, version: u64 },
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The action requires a signed-in user.
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for the per-user course documents.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Returns every course owned by the user.
    async fn list_all(&self, user_id: Uuid) -> PortResult<Vec<Course>>;

    /// Inserts or replaces the course document, enforcing optimistic
    /// concurrency: the write succeeds only when `course.version` matches
    /// the stored version (0 for a brand-new course) and persists
    /// `version + 1`, which is returned. A stale version yields
    /// [`PortError::Conflict`] and leaves the stored document untouched.
    async fn upsert(&self, user_id: Uuid, course: &Course) -> PortResult<u64>;

    /// Removes the course document. Blob cleanup is the caller's job.
    async fn delete(&self, user_id: Uuid, course_id: Uuid) -> PortResult<()>;
}

/// Persistence for raw uploaded bytes, addressed by the resource `db_key`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> PortResult<()>;

    async fn get(&self, key: &str) -> PortResult<Option<Bytes>>;

    /// Best-effort bulk delete; missing keys are not an error.
    async fn delete_many(&self, keys: &[String]) -> PortResult<()>;
}

/// Hosted-LLM generation of study artifacts from extracted source content.
#[async_trait]
pub trait ArtifactGenerationService: Send + Sync {
    /// Produces a study summary of the source material.
    async fn generate_summary(&self, source: &SourceContent) -> PortResult<String>;

    /// Produces exactly five multiple-choice questions whose correct
    /// answers are verbatim quotes from the source.
    async fn generate_quiz(&self, source: &SourceContent) -> PortResult<Vec<QuizQuestion>>;

    /// Produces exactly ten term/definition pairs.
    async fn generate_flashcards(&self, source: &SourceContent) -> PortResult<Vec<Flashcard>>;

    /// Produces a six-panel manga script. Panels carry no image URLs.
    async fn generate_manga_script(&self, source: &SourceContent) -> PortResult<Vec<MangaPanel>>;

    /// Produces a single illustration sheet for the whole script, returned
    /// as a data URL. Best-effort: callers treat failure as a warning.
    async fn generate_sprite_sheet(&self, panels: &[MangaPanel]) -> PortResult<String>;
}

/// Extractive question answering over uploaded text.
#[async_trait]
pub trait ExtractiveQaService: Send + Sync {
    /// Returns a span copied verbatim from `context`, or `None` when the
    /// model finds no answer there. A warming-up endpoint surfaces as
    /// [`PortError::TransientUnavailable`].
    async fn answer_question(&self, question: &str, context: &str) -> PortResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failure() {
        assert_eq!(
            PortError::EmptyResponse.to_string(),
            "The model returned an empty response"
        );
        assert_eq!(
            PortError::TransientUnavailable("model loading".into()).to_string(),
            "Service temporarily unavailable: model loading"
        );
        let id = Uuid::nil();
        assert_eq!(
            PortError::Conflict { course_id: id, version: 3 }.to_string(),
            format!("Version conflict on course {id}: expected to replace version 3")
        );
    }
}
