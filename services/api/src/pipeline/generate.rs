//! services/api/src/pipeline/generate.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! one artifact-generation run: load the stored upload, extract its content,
//! call the model, and merge the result into the course document.

use studyforge_core::domain::{ArtifactKind, Course, GenerationPhase, Resource, SourceKind};
use studyforge_core::ports::PortError;
use studyforge_core::update::{apply_chapter_update, ChapterUpdate, ResourceUpdate};
use tracing::{info, warn};
use uuid::Uuid;

use super::{load_course, PipelineError};
use crate::extract;
use crate::web::state::AppState;

/// What the caller asked the pipeline to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRequest {
    Summary,
    /// `append: true` is "generate more questions": the new batch is added
    /// after the stored ones instead of replacing them.
    Quiz { append: bool },
    Flashcards,
    MangaScript,
}

impl GenerationRequest {
    pub fn artifact(self) -> ArtifactKind {
        match self {
            GenerationRequest::Summary => ArtifactKind::Summary,
            GenerationRequest::Quiz { .. } => ArtifactKind::Quiz,
            GenerationRequest::Flashcards => ArtifactKind::Flashcards,
            GenerationRequest::MangaScript => ArtifactKind::Manga,
        }
    }
}

/// The merged result of a finished run.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// The resource as persisted, with the new artifact in place.
    pub resource: Resource,
    /// The course version after the final save.
    pub version: u64,
    /// Set when the manga illustration failed; the script itself succeeded.
    pub warning: Option<String>,
}

/// The main asynchronous task for one generation run.
///
/// The run holds the (resource, artifact) in-flight slot from start to
/// finish; a concurrent trigger for the same slot gets
/// [`PipelineError::AlreadyRunning`] instead of a queued run. The manga
/// script is persisted before the illustration is attempted, so a failed
/// illustration can never take the script down with it.
pub async fn run_generation(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
    chapter_id: Uuid,
    resource_id: Uuid,
    request: GenerationRequest,
) -> Result<GenerationOutcome, PipelineError> {
    let artifact = request.artifact();
    let guard = state
        .in_flight
        .begin(resource_id, artifact, GenerationPhase::LoadingSource)
        .ok_or(PipelineError::AlreadyRunning {
            owner_id: resource_id,
            artifact,
        })?;
    info!("{} generation started for resource {}.", artifact, resource_id);

    let mut course = load_course(state, user_id, course_id).await?;
    let (file_name, db_key, kind, mime_type) = resource_facts(&course, chapter_id, resource_id)?;

    let bytes = state
        .blobs
        .get(&db_key)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("Stored file {db_key} not found")))?;

    guard.set_phase(GenerationPhase::Extracting);
    let source = extract::extract(&file_name, &mime_type, kind, &bytes)?;

    guard.set_phase(GenerationPhase::AwaitingModel);
    let (update, script) = match request {
        GenerationRequest::Summary => {
            let summary = state.generation_adapter.generate_summary(&source).await?;
            (ResourceUpdate::ReplaceSummary(summary), None)
        }
        GenerationRequest::Quiz { append } => {
            let questions = state.generation_adapter.generate_quiz(&source).await?;
            let update = if append {
                ResourceUpdate::AppendQuizQuestions(questions)
            } else {
                ResourceUpdate::ReplaceQuiz(questions)
            };
            (update, None)
        }
        GenerationRequest::Flashcards => {
            let cards = state.generation_adapter.generate_flashcards(&source).await?;
            (ResourceUpdate::ReplaceFlashcards(cards), None)
        }
        GenerationRequest::MangaScript => {
            let panels = state
                .generation_adapter
                .generate_manga_script(&source)
                .await?;
            (ResourceUpdate::ReplaceMangaScript(panels.clone()), Some(panels))
        }
    };

    guard.set_phase(GenerationPhase::MergingResult);
    merge(&mut course, chapter_id, resource_id, update)?;
    let mut version = state.courses.upsert(user_id, &course).await?;
    course.version = version;

    // Manga only: the illustration is attempted after the script is safely
    // on disk, and a failure downgrades to a warning.
    let mut warning = None;
    if let Some(panels) = script {
        guard.set_phase(GenerationPhase::AwaitingIllustration);
        match state.generation_adapter.generate_sprite_sheet(&panels).await {
            Ok(sheet_url) => {
                guard.set_phase(GenerationPhase::MergingResult);
                merge(
                    &mut course,
                    chapter_id,
                    resource_id,
                    ResourceUpdate::SetMangaSprite(sheet_url),
                )?;
                version = state.courses.upsert(user_id, &course).await?;
                course.version = version;
            }
            Err(e) => {
                warn!(
                    "Illustration failed for resource {}; keeping the script: {}",
                    resource_id, e
                );
                warning = Some(format!("Illustration failed: {e}"));
            }
        }
    }

    let resource = course
        .chapter(chapter_id)
        .and_then(|chapter| chapter.resource(resource_id))
        .cloned()
        .ok_or_else(|| PortError::Unexpected("resource disappeared during merge".to_string()))?;

    info!("{} generation finished for resource {}.", artifact, resource_id);
    Ok(GenerationOutcome {
        resource,
        version,
        warning,
    })
}

/// Copies out what the run needs from the resource record so the course can
/// be borrowed mutably later.
fn resource_facts(
    course: &Course,
    chapter_id: Uuid,
    resource_id: Uuid,
) -> Result<(String, String, SourceKind, String), PipelineError> {
    let chapter = course
        .chapter(chapter_id)
        .ok_or_else(|| PortError::NotFound(format!("Chapter {chapter_id} not found")))?;
    let resource = chapter
        .resource(resource_id)
        .ok_or_else(|| PortError::NotFound(format!("Resource {resource_id} not found")))?;
    Ok((
        resource.name.clone(),
        resource.db_key.clone(),
        resource.kind,
        resource.mime_type.clone(),
    ))
}

fn merge(
    course: &mut Course,
    chapter_id: Uuid,
    resource_id: Uuid,
    update: ResourceUpdate,
) -> Result<(), PipelineError> {
    let chapter = course
        .chapter_mut(chapter_id)
        .ok_or_else(|| PortError::NotFound(format!("Chapter {chapter_id} not found")))?;
    apply_chapter_update(chapter, ChapterUpdate::Resource { resource_id, update })
        .map_err(|e| PipelineError::Port(PortError::NotFound(e.to_string())))
}
