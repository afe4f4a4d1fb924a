//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use studyforge_core::inflight::InFlightRegistry;
use studyforge_core::ports::{
    ArtifactGenerationService, BlobStore, CourseStore, ExtractiveQaService,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub courses: Arc<dyn CourseStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub generation_adapter: Arc<dyn ArtifactGenerationService>,
    pub qa_adapter: Arc<dyn ExtractiveQaService>,
    /// One slot per (owner, artifact); a second trigger while a slot is
    /// occupied is rejected instead of queued.
    pub in_flight: InFlightRegistry,
}
