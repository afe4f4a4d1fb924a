//! services/api/src/pipeline/mod.rs
//!
//! The generation pipeline: the asynchronous "worker" functions that take a
//! triggered run from loading the stored upload through extraction, the
//! model call, and the merge back into the course document. Each run claims
//! its in-flight slot up front and reports its phase there until it ends.

pub mod chat;
pub mod generate;

pub use chat::{run_chat, ChatOutcome};
pub use generate::{run_generation, GenerationOutcome, GenerationRequest};

use studyforge_core::domain::{ArtifactKind, Course};
use studyforge_core::ports::PortError;
use uuid::Uuid;

use crate::extract::ExtractError;
use crate::web::state::AppState;

/// Everything that can end a pipeline run early.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// The (owner, artifact) slot is occupied; the run was never started.
    #[error("A {artifact} run is already in flight for {owner_id}")]
    AlreadyRunning {
        owner_id: Uuid,
        artifact: ArtifactKind,
    },
}

/// The store only lists whole documents, so a single course is fetched by
/// listing the user's courses and picking the one we need.
async fn load_course(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Course, PipelineError> {
    let courses = state.courses.list_all(user_id).await?;
    courses
        .into_iter()
        .find(|course| course.id == course_id)
        .ok_or_else(|| PipelineError::Port(PortError::NotFound(format!("Course {course_id} not found"))))
}
