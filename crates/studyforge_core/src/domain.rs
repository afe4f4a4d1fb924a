//! crates/studyforge_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP layer, but they do
//! fix the JSON shape of the persisted course document (camelCase fields),
//! so the serde attributes here are part of the storage contract.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level study unit owned by a single user.
///
/// `version` is the optimistic-concurrency token: every successful save
/// increments it, and a save carrying a stale version is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub version: u64,
}

/// A chapter groups uploaded resources and carries its own chat thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

/// One uploaded piece of course material plus every study artifact
/// generated from it. The raw bytes live in the blob store under `db_key`;
/// the document only ever holds this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    /// Blob-store key, immutable once assigned.
    pub db_key: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQuestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flashcards: Option<Vec<Flashcard>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manga_script: Option<Vec<MangaPanel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manga_sprite_url: Option<String>,
}

/// Coarse classification of an upload, decided from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Image,
    File,
}

/// A single multiple-choice question. `correct_answer` is expected to be a
/// verbatim quote from the source material and to appear among `options`;
/// the model is instructed to guarantee both, the application does not
/// re-check them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub term: String,
    pub definition: String,
}

/// One panel of the six-panel manga script. `image_url` stays unset; the
/// illustration lives on the resource as a single sprite-sheet URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaPanel {
    pub caption: String,
    pub panel_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single entry in a chapter's chat thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// True when the model could not find an answer span in the uploaded
    /// material and the reply is the advisory fallback.
    #[serde(default)]
    pub is_out_of_context: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// Names the lockable artifact slots of a resource (plus the chat thread of
/// a chapter). At most one generation per (owner, artifact) runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Summary,
    Quiz,
    Flashcards,
    Manga,
    Chat,
}

/// Extractor output and generation input: either plain text or a base64
/// payload the model consumes as an inline attachment. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceContent {
    Text(String),
    Inline { data: String, mime_type: String },
}

/// Phases of one generation run, in the order they occur. A slot that is
/// not in the in-flight registry is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationPhase {
    LoadingSource,
    Extracting,
    AwaitingModel,
    AwaitingIllustration,
    MergingResult,
}

impl Course {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            chapters: Vec::new(),
            version: 0,
        }
    }

    pub fn chapter_mut(&mut self, chapter_id: Uuid) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == chapter_id)
    }

    pub fn chapter(&self, chapter_id: Uuid) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }
}

impl Chapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            resources: Vec::new(),
            chat_history: Vec::new(),
        }
    }

    pub fn resource(&self, resource_id: Uuid) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == resource_id)
    }

    /// Every blob key referenced by this chapter, for cascade deletes.
    pub fn blob_keys(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.db_key.clone()).collect()
    }
}

impl Resource {
    /// Builds a fresh resource record with no artifacts and a newly
    /// allocated blob key.
    pub fn new(
        chapter_id: Uuid,
        name: impl Into<String>,
        kind: SourceKind,
        mime_type: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let db_key = allocate_db_key(chapter_id, &name);
        Self {
            id: Uuid::new_v4(),
            name,
            db_key,
            kind,
            mime_type: mime_type.into(),
            summary: None,
            quiz: None,
            flashcards: None,
            manga_script: None,
            manga_sprite_url: None,
        }
    }
}

impl SourceKind {
    /// Classifies an upload by MIME type: `text/*` is Text, `image/*` is
    /// Image, everything else is a container File.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("text/") {
            SourceKind::Text
        } else if mime_type.starts_with("image/") {
            SourceKind::Image
        } else {
            SourceKind::File
        }
    }
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::Quiz => "quiz",
            ArtifactKind::Flashcards => "flashcards",
            ArtifactKind::Manga => "manga",
            ArtifactKind::Chat => "chat",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocates the blob-store key for an upload:
/// `resource-{chapterId}-{unixMillis}-{fileName}`.
pub fn allocate_db_key(chapter_id: Uuid, file_name: &str) -> String {
    format!(
        "resource-{}-{}-{}",
        chapter_id,
        Utc::now().timestamp_millis(),
        file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_classifies_by_mime_prefix() {
        assert_eq!(SourceKind::from_mime("text/plain"), SourceKind::Text);
        assert_eq!(SourceKind::from_mime("text/markdown"), SourceKind::Text);
        assert_eq!(SourceKind::from_mime("image/png"), SourceKind::Image);
        assert_eq!(SourceKind::from_mime("application/pdf"), SourceKind::File);
        assert_eq!(
            SourceKind::from_mime(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            ),
            SourceKind::File
        );
    }

    #[test]
    fn db_key_embeds_chapter_and_file_name() {
        let chapter_id = Uuid::new_v4();
        let key = allocate_db_key(chapter_id, "notes.txt");
        assert!(key.starts_with(&format!("resource-{chapter_id}-")));
        assert!(key.ends_with("-notes.txt"));
    }

    #[test]
    fn course_document_uses_camel_case() {
        let mut course = Course::new("Biology");
        let mut chapter = Chapter::new("Photosynthesis");
        let resource = Resource::new(chapter.id, "notes.txt", SourceKind::Text, "text/plain");
        chapter.resources.push(resource);
        chapter.chat_history.push(ChatMessage {
            role: ChatRole::Model,
            content: "hello".into(),
            is_out_of_context: true,
        });
        course.chapters.push(chapter);

        let json = serde_json::to_value(&course).unwrap();
        let chapter_json = &json["chapters"][0];
        assert!(chapter_json.get("chatHistory").is_some());
        let resource_json = &chapter_json["resources"][0];
        assert_eq!(resource_json["type"], "text");
        assert!(resource_json.get("dbKey").is_some());
        assert!(resource_json.get("mimeType").is_some());
        // Unset artifacts are omitted from the stored document.
        assert!(resource_json.get("summary").is_none());
        assert_eq!(chapter_json["chatHistory"][0]["isOutOfContext"], true);

        let back: Course = serde_json::from_value(json).unwrap();
        assert_eq!(back, course);
    }

    #[test]
    fn documents_without_version_default_to_zero() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": "History",
            "chapters": [],
        });
        let course: Course = serde_json::from_value(json).unwrap();
        assert_eq!(course.version, 0);
    }
}
