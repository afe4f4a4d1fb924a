//! crates/studyforge_core/src/update.rs
//!
//! Typed update operations for the course document. Every mutation of a
//! chapter's study artifacts or chat thread is expressed as one of these
//! operations and dispatched through a single reducer, so the merge policy
//! lives in exactly one place instead of ad-hoc field writes.

use uuid::Uuid;

use crate::domain::{Chapter, ChatMessage, Flashcard, MangaPanel, QuizQuestion, Resource};

/// Mutations that target a single resource's artifact slots.
///
/// Artifacts are replaced wholesale; [`ResourceUpdate::AppendQuizQuestions`]
/// is the only accumulating operation ("generate more questions" adds a
/// batch without touching the ones already stored).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceUpdate {
    ReplaceSummary(String),
    ReplaceQuiz(Vec<QuizQuestion>),
    AppendQuizQuestions(Vec<QuizQuestion>),
    ReplaceFlashcards(Vec<Flashcard>),
    ReplaceMangaScript(Vec<MangaPanel>),
    SetMangaSprite(String),
}

/// Mutations that target a chapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterUpdate {
    Resource {
        resource_id: Uuid,
        update: ResourceUpdate,
    },
    /// Chat history only ever grows; there is no rewrite operation.
    AppendChatMessage(ChatMessage),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum UpdateError {
    #[error("Resource {0} not found in chapter")]
    ResourceNotFound(Uuid),
}

/// Applies one update to the chapter, in place.
pub fn apply_chapter_update(chapter: &mut Chapter, update: ChapterUpdate) -> Result<(), UpdateError> {
    match update {
        ChapterUpdate::Resource { resource_id, update } => {
            let resource = chapter
                .resources
                .iter_mut()
                .find(|r| r.id == resource_id)
                .ok_or(UpdateError::ResourceNotFound(resource_id))?;
            apply_resource_update(resource, update);
            Ok(())
        }
        ChapterUpdate::AppendChatMessage(message) => {
            chapter.chat_history.push(message);
            Ok(())
        }
    }
}

fn apply_resource_update(resource: &mut Resource, update: ResourceUpdate) {
    match update {
        ResourceUpdate::ReplaceSummary(summary) => {
            resource.summary = Some(summary);
        }
        ResourceUpdate::ReplaceQuiz(questions) => {
            resource.quiz = Some(questions);
        }
        ResourceUpdate::AppendQuizQuestions(batch) => {
            resource.quiz.get_or_insert_with(Vec::new).extend(batch);
        }
        ResourceUpdate::ReplaceFlashcards(cards) => {
            resource.flashcards = Some(cards);
        }
        ResourceUpdate::ReplaceMangaScript(panels) => {
            // A new script invalidates any previously generated sheet.
            resource.manga_script = Some(panels);
            resource.manga_sprite_url = None;
        }
        ResourceUpdate::SetMangaSprite(url) => {
            resource.manga_sprite_url = Some(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatRole, SourceKind};

    fn chapter_with_resource() -> (Chapter, Uuid) {
        let mut chapter = Chapter::new("Cells");
        let resource = Resource::new(chapter.id, "notes.txt", SourceKind::Text, "text/plain");
        let resource_id = resource.id;
        chapter.resources.push(resource);
        (chapter, resource_id)
    }

    fn question(text: &str) -> QuizQuestion {
        QuizQuestion {
            question: text.into(),
            options: vec!["a".into(), "b".into()],
            correct_answer: "a".into(),
        }
    }

    #[test]
    fn replace_summary_sets_the_slot() {
        let (mut chapter, resource_id) = chapter_with_resource();
        apply_chapter_update(
            &mut chapter,
            ChapterUpdate::Resource {
                resource_id,
                update: ResourceUpdate::ReplaceSummary("short".into()),
            },
        )
        .unwrap();
        assert_eq!(chapter.resources[0].summary.as_deref(), Some("short"));
    }

    #[test]
    fn append_quiz_creates_then_extends_without_touching_earlier_batches() {
        let (mut chapter, resource_id) = chapter_with_resource();
        let first: Vec<_> = (0..5).map(|i| question(&format!("q{i}"))).collect();
        let second: Vec<_> = (5..10).map(|i| question(&format!("q{i}"))).collect();

        apply_chapter_update(
            &mut chapter,
            ChapterUpdate::Resource {
                resource_id,
                update: ResourceUpdate::AppendQuizQuestions(first.clone()),
            },
        )
        .unwrap();
        apply_chapter_update(
            &mut chapter,
            ChapterUpdate::Resource {
                resource_id,
                update: ResourceUpdate::AppendQuizQuestions(second.clone()),
            },
        )
        .unwrap();

        let quiz = chapter.resources[0].quiz.as_ref().unwrap();
        assert_eq!(quiz.len(), 10);
        assert_eq!(&quiz[..5], &first[..]);
        assert_eq!(&quiz[5..], &second[..]);
    }

    #[test]
    fn new_script_clears_the_stale_sprite() {
        let (mut chapter, resource_id) = chapter_with_resource();
        chapter.resources[0].manga_sprite_url = Some("data:image/svg+xml;base64,old".into());

        let panels = vec![MangaPanel {
            caption: "Panel one".into(),
            panel_prompt: "a leaf in sunlight".into(),
            image_url: None,
        }];
        apply_chapter_update(
            &mut chapter,
            ChapterUpdate::Resource {
                resource_id,
                update: ResourceUpdate::ReplaceMangaScript(panels),
            },
        )
        .unwrap();

        let resource = &chapter.resources[0];
        assert!(resource.manga_script.is_some());
        assert_eq!(resource.manga_sprite_url, None);
    }

    #[test]
    fn chat_messages_append_in_order() {
        let (mut chapter, _) = chapter_with_resource();
        for (role, content) in [(ChatRole::User, "what is ATP?"), (ChatRole::Model, "ATP")] {
            apply_chapter_update(
                &mut chapter,
                ChapterUpdate::AppendChatMessage(ChatMessage {
                    role,
                    content: content.into(),
                    is_out_of_context: false,
                }),
            )
            .unwrap();
        }
        assert_eq!(chapter.chat_history.len(), 2);
        assert_eq!(chapter.chat_history[0].role, ChatRole::User);
        assert_eq!(chapter.chat_history[1].content, "ATP");
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let (mut chapter, _) = chapter_with_resource();
        let missing = Uuid::new_v4();
        let err = apply_chapter_update(
            &mut chapter,
            ChapterUpdate::Resource {
                resource_id: missing,
                update: ResourceUpdate::ReplaceSummary("x".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err, UpdateError::ResourceNotFound(missing));
    }
}
