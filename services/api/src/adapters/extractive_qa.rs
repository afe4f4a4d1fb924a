//! services/api/src/adapters/extractive_qa.rs
//!
//! This module contains the adapter for the hosted extractive
//! question-answering model. It implements the `ExtractiveQaService` port
//! against the HuggingFace Inference API, which answers with a span copied
//! out of the supplied context rather than generated prose.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use studyforge_core::ports::{ExtractiveQaService, PortError, PortResult};

/// The hosted model truncates long inputs anyway; capping here keeps the
/// request small and the behavior predictable.
pub const MAX_CONTEXT_CHARS: usize = 3000;

#[derive(Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
}

#[derive(Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

/// Inference API answers either `{answer, score, start, end}` or `{error}`.
#[derive(Deserialize)]
struct QaResponse {
    answer: Option<String>,
    error: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExtractiveQaService` against a hosted
/// inference endpoint.
#[derive(Clone)]
pub struct HuggingFaceQaAdapter {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HuggingFaceQaAdapter {
    /// Creates a new `HuggingFaceQaAdapter`.
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl ExtractiveQaService for HuggingFaceQaAdapter {
    async fn answer_question(&self, question: &str, context: &str) -> PortResult<Option<String>> {
        let capped: String = context.chars().take(MAX_CONTEXT_CHARS).collect();
        let body = QaRequest {
            inputs: QaInputs {
                question,
                context: &capped,
            },
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // 503 from the Inference API means the model is still being loaded
        // onto a worker, not that the request was bad.
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Err(PortError::TransientUnavailable(
                "The model is currently loading. Please try again in a few seconds.".to_string(),
            ));
        }

        let payload: QaResponse = response
            .json()
            .await
            .map_err(|e| PortError::MalformedResponse(e.to_string()))?;

        if let Some(error) = payload.error {
            return Err(PortError::Unexpected(error));
        }

        // An empty span counts as "no answer in this context".
        Ok(payload.answer.filter(|answer| !answer.trim().is_empty()))
    }
}
