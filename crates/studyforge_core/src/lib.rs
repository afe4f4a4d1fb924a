pub mod domain;
pub mod inflight;
pub mod ports;
pub mod update;

pub use domain::{
    ArtifactKind, Chapter, ChatMessage, ChatRole, Course, Flashcard, GenerationPhase, MangaPanel,
    QuizQuestion, Resource, SourceContent, SourceKind,
};
pub use inflight::{InFlightEntry, InFlightGuard, InFlightRegistry};
pub use ports::{
    ArtifactGenerationService, BlobStore, CourseStore, ExtractiveQaService, PortError, PortResult,
};
pub use update::{apply_chapter_update, ChapterUpdate, ResourceUpdate, UpdateError};
