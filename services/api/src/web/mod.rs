pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible to the binary that
// will build the web server router.
pub use rest::{
    chat_handler, create_chapter_handler, create_course_handler, delete_chapter_handler,
    delete_course_handler, delete_resource_handler, generate_artifact_handler,
    list_courses_handler, list_generations_handler, upload_resource_handler,
};
