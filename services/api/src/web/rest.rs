//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::extract::{self, ExtractError};
use crate::pipeline::{self, GenerationRequest, PipelineError};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studyforge_core::domain::{
    ArtifactKind, Chapter, ChatMessage, Course, GenerationPhase, Resource, SourceKind,
};
use studyforge_core::ports::PortError;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_resource_handler,
    ),
    components(
        schemas(UploadResourceResponse)
    ),
    tags(
        (name = "StudyForge API", description = "API endpoints for course material and generated study artifacts.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize)]
pub struct CreateCoursePayload {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateChapterPayload {
    pub name: String,
}

/// The artifacts a client can ask the pipeline to generate.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedArtifact {
    Summary,
    Quiz,
    Flashcards,
    Manga,
}

#[derive(Deserialize)]
pub struct GenerateArtifactPayload {
    pub artifact: RequestedArtifact,
    /// Quiz only: add a new batch of questions after the stored ones.
    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize)]
pub struct ChatPayload {
    pub message: String,
}

/// The response payload sent after successfully storing an upload.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResourceResponse {
    resource_id: Uuid,
    db_key: String,
    version: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    resource: Resource,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    reply: ChatMessage,
    version: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatusResponse {
    owner_id: Uuid,
    artifact: ArtifactKind,
    phase: GenerationPhase,
}

//=========================================================================================
// Shared Handler Helpers
//=========================================================================================

/// Pulls the authenticated user out of the `x-user-id` header.
fn require_user(headers: &HeaderMap) -> Result<Uuid, (StatusCode, String)> {
    let value = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "x-user-id header is required".to_string(),
            )
        })?;
    Uuid::parse_str(value).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid x-user-id format".to_string(),
        )
    })
}

fn port_error_response(error: PortError) -> (StatusCode, String) {
    let status = match &error {
        PortError::Unauthenticated => StatusCode::UNAUTHORIZED,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict { .. } => StatusCode::CONFLICT,
        PortError::EmptyResponse | PortError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        PortError::TransientUnavailable(_) | PortError::StorageUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", error);
    }
    (status, error.to_string())
}

fn extract_error_response(error: ExtractError) -> (StatusCode, String) {
    let status = match &error {
        ExtractError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ExtractError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, error.to_string())
}

fn pipeline_error_response(error: PipelineError) -> (StatusCode, String) {
    match error {
        PipelineError::Port(port) => port_error_response(port),
        PipelineError::Extract(extract) => extract_error_response(extract),
        busy @ PipelineError::AlreadyRunning { .. } => (StatusCode::CONFLICT, busy.to_string()),
    }
}

async fn load_course(
    app_state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Course, (StatusCode, String)> {
    let courses = app_state
        .courses
        .list_all(user_id)
        .await
        .map_err(port_error_response)?;
    courses
        .into_iter()
        .find(|course| course.id == course_id)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Course {course_id} not found"),
            )
        })
}

//=========================================================================================
// Course & Chapter Handlers
//=========================================================================================

/// List every course the user owns, artifacts and chat history included.
pub async fn list_courses_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let courses = app_state
        .courses
        .list_all(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(courses))
}

/// Create an empty course.
pub async fn create_course_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCoursePayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let mut course = Course::new(payload.name);
    course.version = app_state
        .courses
        .upsert(user_id, &course)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Delete a course along with every uploaded file it references.
pub async fn delete_course_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let course = load_course(&app_state, user_id, course_id).await?;

    let keys: Vec<String> = course
        .chapters
        .iter()
        .flat_map(Chapter::blob_keys)
        .collect();

    // The document goes first so a half-finished delete can never leave it
    // pointing at blobs that are already gone.
    app_state
        .courses
        .delete(user_id, course_id)
        .await
        .map_err(port_error_response)?;
    app_state
        .blobs
        .delete_many(&keys)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add an empty chapter to a course.
pub async fn create_chapter_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<CreateChapterPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let mut course = load_course(&app_state, user_id, course_id).await?;

    course.chapters.push(Chapter::new(payload.name));
    course.version = app_state
        .courses
        .upsert(user_id, &course)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Delete a chapter along with every uploaded file it references.
pub async fn delete_chapter_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let mut course = load_course(&app_state, user_id, course_id).await?;

    let position = course
        .chapters
        .iter()
        .position(|chapter| chapter.id == chapter_id)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Chapter {chapter_id} not found"),
            )
        })?;
    let removed = course.chapters.remove(position);
    let keys = removed.blob_keys();

    course.version = app_state
        .courses
        .upsert(user_id, &course)
        .await
        .map_err(port_error_response)?;
    app_state
        .blobs
        .delete_many(&keys)
        .await
        .map_err(port_error_response)?;
    Ok(Json(course))
}

//=========================================================================================
// Resource Handlers
//=========================================================================================

/// Upload course material into a chapter.
///
/// Accepts a multipart/form-data request with a single file part. The file's
/// declared content type decides how it will later be extracted; a type the
/// extractor cannot handle is rejected here, before anything is stored.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/chapters/{chapter_id}/resources",
    request_body(content_type = "multipart/form-data", description = "The course material to upload."),
    responses(
        (status = 201, description = "Resource stored successfully", body = UploadResourceResponse),
        (status = 401, description = "Missing or invalid x-user-id header"),
        (status = 404, description = "Course or chapter not found"),
        (status = 415, description = "Unsupported file format"),
        (status = 503, description = "Storage unavailable")
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to add to."),
        ("chapter_id" = Uuid, Path, description = "The chapter to add to."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn upload_resource_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;

    let (file_name, mime_type, data) = if let Some(field) =
        multipart.next_field().await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read multipart data: {}", e),
            )
        })? {
        let name = field.file_name().unwrap_or("untitled.txt").to_string();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        (name, mime, data)
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a file".to_string(),
        ));
    };

    let kind = SourceKind::from_mime(&mime_type);
    if !extract::is_supported(&file_name, &mime_type, kind) {
        return Err(extract_error_response(ExtractError::UnsupportedFormat {
            file_name,
            mime_type,
        }));
    }

    let mut course = load_course(&app_state, user_id, course_id).await?;
    let chapter = course.chapter_mut(chapter_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("Chapter {chapter_id} not found"),
        )
    })?;

    let resource = Resource::new(chapter_id, file_name, kind, mime_type);
    let resource_id = resource.id;
    let db_key = resource.db_key.clone();
    chapter.resources.push(resource);

    // The blob goes first so the document never references bytes that were
    // never stored.
    app_state
        .blobs
        .put(&db_key, data)
        .await
        .map_err(port_error_response)?;
    let version = app_state
        .courses
        .upsert(user_id, &course)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResourceResponse {
            resource_id,
            db_key,
            version,
        }),
    ))
}

/// Delete a resource along with its uploaded file.
pub async fn delete_resource_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((course_id, chapter_id, resource_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let mut course = load_course(&app_state, user_id, course_id).await?;

    let db_key = {
        let chapter = course.chapter_mut(chapter_id).ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Chapter {chapter_id} not found"),
            )
        })?;
        let position = chapter
            .resources
            .iter()
            .position(|resource| resource.id == resource_id)
            .ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    format!("Resource {resource_id} not found"),
                )
            })?;
        chapter.resources.remove(position).db_key
    };

    course.version = app_state
        .courses
        .upsert(user_id, &course)
        .await
        .map_err(port_error_response)?;
    app_state
        .blobs
        .delete_many(&[db_key])
        .await
        .map_err(port_error_response)?;
    Ok(Json(course))
}

//=========================================================================================
// Generation & Chat Handlers
//=========================================================================================

/// Trigger one artifact generation for a resource.
pub async fn generate_artifact_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((course_id, chapter_id, resource_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(payload): Json<GenerateArtifactPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let request = match payload.artifact {
        RequestedArtifact::Summary => GenerationRequest::Summary,
        RequestedArtifact::Quiz => GenerationRequest::Quiz {
            append: payload.append,
        },
        RequestedArtifact::Flashcards => GenerationRequest::Flashcards,
        RequestedArtifact::Manga => GenerationRequest::MangaScript,
    };

    let outcome = pipeline::run_generation(
        &app_state,
        user_id,
        course_id,
        chapter_id,
        resource_id,
        request,
    )
    .await
    .map_err(pipeline_error_response)?;

    Ok(Json(GenerationResponse {
        resource: outcome.resource,
        version: outcome.version,
        warning: outcome.warning,
    }))
}

/// Ask a question against the chapter's uploaded material.
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((course_id, chapter_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ChatPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user(&headers)?;
    let outcome = pipeline::run_chat(&app_state, user_id, course_id, chapter_id, payload.message)
        .await
        .map_err(pipeline_error_response)?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        version: outcome.version,
    }))
}

/// Report every generation currently in flight and the phase it is in.
pub async fn list_generations_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_user(&headers)?;
    let statuses: Vec<GenerationStatusResponse> = app_state
        .in_flight
        .snapshot()
        .into_iter()
        .map(|entry| GenerationStatusResponse {
            owner_id: entry.owner_id,
            artifact: entry.artifact,
            phase: entry.phase,
        })
        .collect();
    Ok(Json(statuses))
}
