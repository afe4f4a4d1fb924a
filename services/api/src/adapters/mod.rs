pub mod extractive_qa;
pub mod generation_llm;
pub mod store;

pub use extractive_qa::HuggingFaceQaAdapter;
pub use generation_llm::OpenAiGenerationAdapter;
pub use store::{MemoryStore, PgStore};
