//! services/api/src/pipeline/chat.rs
//!
//! This module contains the asynchronous "worker" function for one chat
//! turn: gather the chapter's readable material into a QA context, ask the
//! extractive model, and append both sides of the exchange to the chapter's
//! chat history.

use studyforge_core::domain::{
    ArtifactKind, ChatMessage, ChatRole, GenerationPhase, SourceContent,
};
use studyforge_core::ports::PortError;
use studyforge_core::update::{apply_chapter_update, ChapterUpdate};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{load_course, PipelineError};
use crate::extract;
use crate::web::state::AppState;

const NO_ANSWER_REPLY: &str = "I couldn't find an answer in the provided text.";
const CONNECTION_ERROR_REPLY: &str =
    "Sorry, I encountered an error while connecting to the AI service.";

/// A finished chat turn.
#[derive(Debug)]
pub struct ChatOutcome {
    /// The model-side message that was appended to the history.
    pub reply: ChatMessage,
    /// The course version after the save.
    pub version: u64,
}

/// The main asynchronous task for one chat turn.
///
/// A chapter runs at most one turn at a time; a second question while one is
/// in flight gets [`PipelineError::AlreadyRunning`]. Model trouble never
/// fails the turn: it becomes an advisory reply, and both messages are
/// appended in a single save.
pub async fn run_chat(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
    chapter_id: Uuid,
    question: String,
) -> Result<ChatOutcome, PipelineError> {
    let guard = state
        .in_flight
        .begin(chapter_id, ArtifactKind::Chat, GenerationPhase::LoadingSource)
        .ok_or(PipelineError::AlreadyRunning {
            owner_id: chapter_id,
            artifact: ArtifactKind::Chat,
        })?;
    info!("Chat turn started for chapter {}.", chapter_id);

    let mut course = load_course(state, user_id, course_id).await?;
    course
        .chapter(chapter_id)
        .ok_or_else(|| PortError::NotFound(format!("Chapter {chapter_id} not found")))?;

    guard.set_phase(GenerationPhase::Extracting);
    let context = build_context(state, &course, chapter_id).await?;

    let reply = if context.trim().is_empty() {
        // Nothing readable to search; don't bother the model.
        model_message(NO_ANSWER_REPLY, true)
    } else {
        guard.set_phase(GenerationPhase::AwaitingModel);
        match state.qa_adapter.answer_question(&question, &context).await {
            Ok(Some(answer)) => model_message(&answer, false),
            Ok(None) => model_message(NO_ANSWER_REPLY, true),
            Err(PortError::TransientUnavailable(notice)) => {
                warn!("QA model unavailable for chapter {}: {}", chapter_id, notice);
                model_message(&notice, false)
            }
            Err(e) => {
                error!("Question answering failed for chapter {}: {}", chapter_id, e);
                model_message(CONNECTION_ERROR_REPLY, false)
            }
        }
    };

    guard.set_phase(GenerationPhase::MergingResult);
    {
        let chapter = course
            .chapter_mut(chapter_id)
            .ok_or_else(|| PortError::NotFound(format!("Chapter {chapter_id} not found")))?;
        let user_message = ChatMessage {
            role: ChatRole::User,
            content: question,
            is_out_of_context: false,
        };
        for message in [user_message, reply.clone()] {
            apply_chapter_update(chapter, ChapterUpdate::AppendChatMessage(message))
                .map_err(|e| PipelineError::Port(PortError::Unexpected(e.to_string())))?;
        }
    }
    let version = state.courses.upsert(user_id, &course).await?;

    info!("Chat turn finished for chapter {}.", chapter_id);
    Ok(ChatOutcome { reply, version })
}

fn model_message(content: &str, is_out_of_context: bool) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Model,
        content: content.to_string(),
        is_out_of_context,
    }
}

/// Joins the extracted text of every readable resource in the chapter, in
/// list order. Resources that are binary, missing from the blob store, or
/// fail extraction are skipped; the QA adapter caps the final length.
async fn build_context(
    state: &AppState,
    course: &studyforge_core::domain::Course,
    chapter_id: Uuid,
) -> Result<String, PipelineError> {
    let chapter = course
        .chapter(chapter_id)
        .ok_or_else(|| PortError::NotFound(format!("Chapter {chapter_id} not found")))?;

    let mut sections = Vec::new();
    for resource in &chapter.resources {
        let Some(bytes) = state.blobs.get(&resource.db_key).await? else {
            warn!("Blob {} is missing; skipping it for chat context.", resource.db_key);
            continue;
        };
        match extract::extract(&resource.name, &resource.mime_type, resource.kind, &bytes) {
            Ok(SourceContent::Text(text)) => sections.push(text),
            Ok(SourceContent::Inline { .. }) => {}
            Err(e) => {
                warn!(
                    "Extraction failed for {}; skipping it for chat context: {}",
                    resource.name, e
                );
            }
        }
    }
    Ok(sections.join("\n\n"))
}
