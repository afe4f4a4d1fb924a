//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the artifact-generating LLM.
//! It implements the `ArtifactGenerationService` port from the `core` crate
//! against any OpenAI-compatible chat-completion endpoint, submitting the
//! extracted source either as a text part or as an inline data-URL image
//! part, and coercing structured answers out of the returned text.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
    error::OpenAIError,
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use studyforge_core::{
    domain::{Flashcard, MangaPanel, QuizQuestion, SourceContent},
    ports::{ArtifactGenerationService, PortError, PortResult},
};

/// Structured artifacts have fixed sizes; anything else is a model error.
pub const QUIZ_QUESTION_COUNT: usize = 5;
pub const FLASHCARD_COUNT: usize = 10;
pub const MANGA_PANEL_COUNT: usize = 6;

const SUMMARY_PROMPT: &str = "Provide a concise, easy-to-understand summary of the following \
course material. Use headings and bullet points for clarity.";

const QUIZ_PROMPT: &str = "You are an extractive question-answering agent. Your task is to \
create a 5-question multiple-choice quiz from the provided text.\n\
For each question:\n\
1. Find a specific, factual statement in the text. This will be the correct answer.\n\
2. Formulate a question where that statement is the answer.\n\
3. Create three plausible but incorrect options (distractors).\n\
4. The 'correctAnswer' field in the JSON must be an *exact, verbatim quote* from the source text.";

const QUIZ_SCHEMA: &str = r#"{"type":"ARRAY","items":{"type":"OBJECT","properties":{"question":{"type":"STRING"},"options":{"type":"ARRAY","items":{"type":"STRING"}},"correctAnswer":{"type":"STRING"}},"required":["question","options","correctAnswer"]}}"#;

const FLASHCARDS_PROMPT: &str = "Based on the provided material, create a set of 10 flashcards.\n\
For each flashcard, provide a 'term' (a key concept or name) and a concise 'definition'.";

const FLASHCARDS_SCHEMA: &str = r#"{"type":"ARRAY","items":{"type":"OBJECT","properties":{"term":{"type":"STRING"},"definition":{"type":"STRING"}},"required":["term","definition"]}}"#;

const MANGA_PROMPT: &str = "You are a creative manga scriptwriter. Transform the provided \
material into a compelling 6-panel manga script. For each panel, provide a 'caption' (narration \
or dialogue) and a 'panelPrompt' (a detailed, visual description for an image generation AI, \
focusing on action, setting, and character expression).";

const MANGA_SCHEMA: &str = r#"{"type":"ARRAY","items":{"type":"OBJECT","properties":{"caption":{"type":"STRING"},"panelPrompt":{"type":"STRING"}},"required":["caption","panelPrompt"]}}"#;

const SPRITE_SHEET_PROMPT: &str = "You are a manga illustrator. Draw one sprite sheet for the \
six panels below as a single self-contained SVG image: a 3x2 grid of simple black-and-white \
line-art panels, each panel numbered in its top-left corner. Respond with ONLY the SVG markup, \
starting with <svg and ending with </svg>.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ArtifactGenerationService` using an
/// OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Sends the source parts followed by the instruction and returns the
    /// model's text, trimmed. An answer with no text is `EmptyResponse`.
    async fn complete(
        &self,
        source: Option<&SourceContent>,
        instruction: &str,
        temperature: Option<f32>,
    ) -> PortResult<String> {
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        if let Some(source) = source {
            parts.push(source_part(source)?);
        }
        parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(instruction)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(parts)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(vec![user_message.into()])
            .n(1);
        if let Some(temperature) = temperature {
            builder.temperature(temperature);
        }
        let request = builder
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(PortError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Maps extracted content to a chat message part: plain text stays text,
/// binary payloads travel as a `data:` URL image part.
fn source_part(source: &SourceContent) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    match source {
        SourceContent::Text(text) => Ok(ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(text.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()),
        SourceContent::Inline { data, mime_type } => {
            Ok(ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(format!("data:{mime_type};base64,{data}"))
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into())
        }
    }
}

//=========================================================================================
// Structured Response Parsing
//=========================================================================================

/// Coerces a model's text answer into structured data. Tolerates markdown
/// code fences and leading prose; anything that still fails to parse is
/// `MalformedResponse` — never a partial structure.
fn parse_json_payload<T: DeserializeOwned>(text: &str) -> PortResult<T> {
    let mut payload = text.trim();

    // Clean potential markdown code fences.
    if let Some(stripped) = payload.strip_prefix("```json") {
        payload = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    } else if let Some(stripped) = payload.strip_prefix("```") {
        payload = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }

    // Skip any prose before the first '{' or '['.
    let start = payload
        .find(|c| c == '{' || c == '[')
        .ok_or_else(|| PortError::MalformedResponse("no JSON object or array in the response".to_string()))?;

    serde_json::from_str(&payload[start..]).map_err(|e| PortError::MalformedResponse(e.to_string()))
}

fn check_quiz(questions: Vec<QuizQuestion>) -> PortResult<Vec<QuizQuestion>> {
    if questions.len() != QUIZ_QUESTION_COUNT {
        return Err(PortError::MalformedResponse(format!(
            "expected {} quiz questions, got {}",
            QUIZ_QUESTION_COUNT,
            questions.len()
        )));
    }
    for question in &questions {
        if question.question.trim().is_empty() || question.correct_answer.trim().is_empty() {
            return Err(PortError::MalformedResponse(
                "quiz question with empty question or correctAnswer".to_string(),
            ));
        }
        if question.options.len() < 2 {
            return Err(PortError::MalformedResponse(format!(
                "quiz question '{}' has fewer than 2 options",
                question.question
            )));
        }
    }
    Ok(questions)
}

fn check_flashcards(cards: Vec<Flashcard>) -> PortResult<Vec<Flashcard>> {
    if cards.len() != FLASHCARD_COUNT {
        return Err(PortError::MalformedResponse(format!(
            "expected {} flashcards, got {}",
            FLASHCARD_COUNT,
            cards.len()
        )));
    }
    Ok(cards)
}

fn check_manga_script(panels: Vec<MangaPanel>) -> PortResult<Vec<MangaPanel>> {
    if panels.len() != MANGA_PANEL_COUNT {
        return Err(PortError::MalformedResponse(format!(
            "expected {} manga panels, got {}",
            MANGA_PANEL_COUNT,
            panels.len()
        )));
    }
    // Panels never carry their own illustration; the sheet lives on the
    // resource, so anything the model put here is dropped.
    Ok(panels
        .into_iter()
        .map(|panel| MangaPanel {
            image_url: None,
            ..panel
        })
        .collect())
}

/// Pulls the `<svg>...</svg>` markup out of a model answer that may be
/// fenced or wrapped in prose.
fn extract_svg(text: &str) -> PortResult<&str> {
    let start = text
        .find("<svg")
        .ok_or_else(|| PortError::MalformedResponse("no <svg> element in the response".to_string()))?;
    let end = text
        .rfind("</svg>")
        .filter(|&end| end >= start)
        .ok_or_else(|| PortError::MalformedResponse("unterminated <svg> element".to_string()))?;
    Ok(&text[start..end + "</svg>".len()])
}

//=========================================================================================
// `ArtifactGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ArtifactGenerationService for OpenAiGenerationAdapter {
    async fn generate_summary(&self, source: &SourceContent) -> PortResult<String> {
        self.complete(Some(source), SUMMARY_PROMPT, None).await
    }

    async fn generate_quiz(&self, source: &SourceContent) -> PortResult<Vec<QuizQuestion>> {
        let instruction = format!(
            "{QUIZ_PROMPT}\n\nReturn the response as a JSON array matching this schema: {QUIZ_SCHEMA}"
        );
        let text = self.complete(Some(source), &instruction, None).await?;
        check_quiz(parse_json_payload(&text)?)
    }

    async fn generate_flashcards(&self, source: &SourceContent) -> PortResult<Vec<Flashcard>> {
        let instruction = format!(
            "{FLASHCARDS_PROMPT}\n\nReturn the response as a JSON array matching this schema: {FLASHCARDS_SCHEMA}"
        );
        let text = self.complete(Some(source), &instruction, None).await?;
        check_flashcards(parse_json_payload(&text)?)
    }

    async fn generate_manga_script(&self, source: &SourceContent) -> PortResult<Vec<MangaPanel>> {
        let instruction = format!(
            "{MANGA_PROMPT}\n\nReturn the response as a JSON array matching this schema: {MANGA_SCHEMA}"
        );
        // High creativity for the script, unlike the factual artifacts.
        let text = self
            .complete(Some(source), &instruction, Some(1.0))
            .await?;
        check_manga_script(parse_json_payload(&text)?)
    }

    async fn generate_sprite_sheet(&self, panels: &[MangaPanel]) -> PortResult<String> {
        let panel_lines = panels
            .iter()
            .enumerate()
            .map(|(i, panel)| format!("Panel {}: {}", i + 1, panel.panel_prompt))
            .collect::<Vec<_>>()
            .join("\n");
        let instruction = format!("{SPRITE_SHEET_PROMPT}\n\n{panel_lines}");

        let text = self.complete(None, &instruction, Some(1.0)).await?;
        let svg = extract_svg(&text)?;
        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_json(count: usize, options: usize) -> String {
        let questions: Vec<String> = (0..count)
            .map(|i| {
                let opts: Vec<String> = (0..options).map(|o| format!("\"opt {o}\"")).collect();
                format!(
                    r#"{{"question":"q{i}","options":[{}],"correctAnswer":"opt 0"}}"#,
                    opts.join(",")
                )
            })
            .collect();
        format!("[{}]", questions.join(","))
    }

    #[test]
    fn bare_json_parses() {
        let questions: Vec<QuizQuestion> = parse_json_payload(&quiz_json(5, 4)).unwrap();
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].correct_answer, "opt 0");
    }

    #[test]
    fn json_fence_is_stripped() {
        let text = format!("```json\n{}\n```", quiz_json(5, 4));
        let questions: Vec<QuizQuestion> = parse_json_payload(&text).unwrap();
        assert_eq!(questions.len(), 5);
    }

    #[test]
    fn anonymous_fence_is_stripped() {
        let text = format!("```\n{}\n```", quiz_json(5, 4));
        let questions: Vec<QuizQuestion> = parse_json_payload(&text).unwrap();
        assert_eq!(questions.len(), 5);
    }

    #[test]
    fn leading_prose_is_skipped() {
        let text = format!("Here is your quiz:\n{}", quiz_json(5, 4));
        let questions: Vec<QuizQuestion> = parse_json_payload(&text).unwrap();
        assert_eq!(questions.len(), 5);
    }

    #[test]
    fn truncated_json_fails_loudly() {
        let mut text = quiz_json(5, 4);
        text.truncate(text.len() / 2);
        let err = parse_json_payload::<Vec<QuizQuestion>>(&text).unwrap_err();
        assert!(matches!(err, PortError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_answer_fails_loudly() {
        let err =
            parse_json_payload::<Vec<QuizQuestion>>("I'm sorry, I cannot do that.").unwrap_err();
        assert!(matches!(err, PortError::MalformedResponse(_)));
    }

    #[test]
    fn quiz_must_have_exactly_five_questions() {
        let four: Vec<QuizQuestion> = parse_json_payload(&quiz_json(4, 4)).unwrap();
        assert!(matches!(
            check_quiz(four),
            Err(PortError::MalformedResponse(_))
        ));

        let five: Vec<QuizQuestion> = parse_json_payload(&quiz_json(5, 4)).unwrap();
        let checked = check_quiz(five).unwrap();
        assert_eq!(checked.len(), QUIZ_QUESTION_COUNT);
        assert!(checked.iter().all(|q| q.options.len() >= 2));
    }

    #[test]
    fn quiz_questions_need_at_least_two_options() {
        let one_option: Vec<QuizQuestion> = parse_json_payload(&quiz_json(5, 1)).unwrap();
        assert!(matches!(
            check_quiz(one_option),
            Err(PortError::MalformedResponse(_))
        ));
    }

    #[test]
    fn flashcard_count_is_enforced() {
        let nine: Vec<Flashcard> = (0..9)
            .map(|i| Flashcard {
                term: format!("t{i}"),
                definition: format!("d{i}"),
            })
            .collect();
        assert!(matches!(
            check_flashcards(nine),
            Err(PortError::MalformedResponse(_))
        ));
    }

    #[test]
    fn manga_panels_are_six_and_never_carry_images() {
        let panels: Vec<MangaPanel> = (0..6)
            .map(|i| MangaPanel {
                caption: format!("c{i}"),
                panel_prompt: format!("p{i}"),
                image_url: Some("data:image/png;base64,AAAA".to_string()),
            })
            .collect();
        let checked = check_manga_script(panels).unwrap();
        assert_eq!(checked.len(), MANGA_PANEL_COUNT);
        assert!(checked.iter().all(|p| p.image_url.is_none()));

        let five: Vec<MangaPanel> = (0..5)
            .map(|i| MangaPanel {
                caption: format!("c{i}"),
                panel_prompt: format!("p{i}"),
                image_url: None,
            })
            .collect();
        assert!(matches!(
            check_manga_script(five),
            Err(PortError::MalformedResponse(_))
        ));
    }

    #[test]
    fn svg_markup_is_pulled_out_of_prose_and_fences() {
        let text = "```svg\n<svg viewBox=\"0 0 10 10\"><rect/></svg>\n```";
        assert_eq!(
            extract_svg(text).unwrap(),
            "<svg viewBox=\"0 0 10 10\"><rect/></svg>"
        );

        let err = extract_svg("here is a picture of a cat").unwrap_err();
        assert!(matches!(err, PortError::MalformedResponse(_)));
    }
}
