use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analyzer::{InferenceBackend, InferenceRequest};
use crate::config::AiConfig;
use crate::error::AnalysisBackendError;

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize, Debug)]
struct ChatContent {
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint.
pub struct HttpInferenceClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpInferenceClient {
    pub fn new(ai: &AiConfig) -> Result<Self> {
        let client = Client::builder().timeout(ai.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: ai.endpoint.clone(),
            api_key: ai.api_key.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, AnalysisBackendError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.payload,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            log::warn!("Inference backend rate limited (retry after {:?}).", retry_after);
            return Err(AnalysisBackendError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(AnalysisBackendError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisBackendError::Rejected {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        let text = response.text().await.map_err(map_transport_error)?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| AnalysisBackendError::SchemaMismatch {
                message: format!("response envelope: {e}"),
            })?;
        log::info!("Inference response received ({} bytes).", text.len());

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AnalysisBackendError::SchemaMismatch {
                message: "response has no message content".to_string(),
            })
    }
}

fn map_transport_error(e: reqwest::Error) -> AnalysisBackendError {
    if e.is_timeout() {
        AnalysisBackendError::Timeout
    } else {
        AnalysisBackendError::Network {
            message: e.to_string(),
        }
    }
}
