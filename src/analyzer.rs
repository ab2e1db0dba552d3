use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{AiConfig, Config, RulePolicy};
use crate::error::{AnalysisBackendError, DeviceUnavailableError};
use crate::net::HttpInferenceClient;
use crate::rules;
use crate::types::{
    Assessment, FallbackReason, HealthSnapshot, Issue, MetricField, Provenance, Severity,
};

const TEMPERATURE: f32 = 0.3;

const INSTRUCTIONS: &str = r#"You are an expert Android device health analyst. Analyze the device health snapshot you are given and respond ONLY with a JSON object, no markdown, of this exact shape:
{"health_score": <integer 0-100, 100 is perfect health>, "summary": "<2-3 sentence overview>", "issues": [{"category": "<short-kebab-case-name>", "severity": "<critical|warning|info>", "description": "<what is wrong>", "recommendation": "<one action>"}], "recommendations": ["<actionable step>"]}
Fields reported with "status": "unavailable" could not be collected and are not faults in themselves."#;

/// What gets sent to an inference backend for one snapshot.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub instructions: String,
    /// Compact snapshot JSON.
    pub payload: String,
    pub temperature: f32,
}

/// A remote model that turns a request into raw response text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, AnalysisBackendError>;
}

#[derive(Deserialize, Debug)]
struct Verdict {
    health_score: i64,
    #[serde(default)]
    summary: Option<String>,
    issues: Vec<VerdictIssue>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct VerdictIssue {
    category: String,
    severity: Severity,
    description: String,
    #[serde(default)]
    recommendation: Option<String>,
}

enum AnalysisState<'a> {
    AiAttempt {
        backend: &'a dyn InferenceBackend,
        request: InferenceRequest,
        attempt: u32,
    },
    Fallback(AnalysisBackendError),
}

/// Scores snapshots through the inference backend, falling back to the local
/// rule engine on any failure. One instance is shared by every scan in the
/// process so that a rate-limit cooldown applies to all of them.
pub struct Analyzer {
    backend: Option<Arc<dyn InferenceBackend>>,
    settings: AiConfig,
    policy: RulePolicy,
    cooldown_until: Mutex<Option<Instant>>,
}

impl Analyzer {
    pub fn new(
        backend: Option<Arc<dyn InferenceBackend>>,
        settings: AiConfig,
        policy: RulePolicy,
    ) -> Self {
        Self {
            backend,
            settings,
            policy,
            cooldown_until: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let backend: Option<Arc<dyn InferenceBackend>> = if config.ai.is_configured() {
            match HttpInferenceClient::new(&config.ai) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Could not build inference client, using rule engine only");
                    None
                }
            }
        } else {
            info!("No inference API key configured, using rule engine only");
            None
        };
        Self::new(backend, config.ai.clone(), config.rules.clone())
    }

    /// Never fails: every backend error ends in a rule-based assessment.
    pub async fn analyze(&self, snapshot: &HealthSnapshot) -> Assessment {
        let mut state = match self.prepare(snapshot) {
            Ok((backend, request)) => AnalysisState::AiAttempt {
                backend,
                request,
                attempt: 0,
            },
            Err(e) => AnalysisState::Fallback(e),
        };

        loop {
            state = match state {
                AnalysisState::AiAttempt {
                    backend,
                    request,
                    attempt,
                } => {
                    let outcome = self.attempt(backend, &request).await;
                    match outcome {
                        Ok(assessment) => {
                            info!(score = assessment.score, "AI assessment accepted");
                            return assessment;
                        }
                        Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                            let delay = self.retry_delay();
                            warn!(error = %e, attempt = attempt + 1, ?delay, "Retrying inference");
                            tokio::time::sleep(delay).await;
                            AnalysisState::AiAttempt {
                                backend,
                                request,
                                attempt: attempt + 1,
                            }
                        }
                        Err(e) => AnalysisState::Fallback(e),
                    }
                }
                AnalysisState::Fallback(e) => {
                    let reason = e.fallback_reason();
                    match e {
                        AnalysisBackendError::NotConfigured => {}
                        e => warn!(error = %e, ?reason, "Falling back to rule engine"),
                    }
                    return self.fallback(snapshot, reason);
                }
            };
        }
    }

    /// Rule-based assessment stamped with why the AI path was not used.
    pub fn fallback(&self, snapshot: &HealthSnapshot, reason: FallbackReason) -> Assessment {
        rules::evaluate(snapshot, &self.policy, reason)
    }

    /// Assessment for a device that disappeared during collection. The AI
    /// path is not tried.
    pub fn disconnected(
        &self,
        snapshot: &HealthSnapshot,
        failure: &DeviceUnavailableError,
    ) -> Assessment {
        rules::disconnected(snapshot, &self.policy, failure)
    }

    pub fn cooldown_active(&self) -> bool {
        match self.cooldown_until.lock() {
            Ok(guard) => (*guard).is_some_and(|until| Instant::now() < until),
            Err(_) => false,
        }
    }

    fn arm_cooldown(&self, retry_after: Option<Duration>) {
        let wait =
            retry_after.unwrap_or_else(|| Duration::from_secs(self.settings.rate_limit_cooldown_secs));
        if let Ok(mut guard) = self.cooldown_until.lock() {
            *guard = Some(Instant::now() + wait);
        }
        warn!(?wait, "Inference rate limited, pausing AI requests");
    }

    fn retry_delay(&self) -> Duration {
        let base = self.settings.retry_delay_ms;
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base + jitter)
    }

    fn prepare(
        &self,
        snapshot: &HealthSnapshot,
    ) -> Result<(&dyn InferenceBackend, InferenceRequest), AnalysisBackendError> {
        let backend = self
            .backend
            .as_deref()
            .ok_or(AnalysisBackendError::NotConfigured)?;
        if self.cooldown_active() {
            return Err(AnalysisBackendError::RateLimited { retry_after: None });
        }
        Ok((backend, self.build_request(snapshot)?))
    }

    pub fn build_request(
        &self,
        snapshot: &HealthSnapshot,
    ) -> Result<InferenceRequest, AnalysisBackendError> {
        let mut trimmed = snapshot.clone();
        if let MetricField::Ok(recent) = &mut trimmed.logs.recent {
            recent.truncate(self.settings.prompt_log_lines);
        }
        let payload =
            serde_json::to_string(&trimmed).map_err(|e| AnalysisBackendError::SchemaMismatch {
                message: format!("snapshot serialization: {e}"),
            })?;
        Ok(InferenceRequest {
            model: self.settings.model.clone(),
            instructions: INSTRUCTIONS.to_string(),
            payload,
            temperature: TEMPERATURE,
        })
    }

    async fn attempt(
        &self,
        backend: &dyn InferenceBackend,
        request: &InferenceRequest,
    ) -> Result<Assessment, AnalysisBackendError> {
        let result = match tokio::time::timeout(self.settings.timeout(), backend.infer(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(AnalysisBackendError::Timeout),
        };
        if let Err(AnalysisBackendError::RateLimited { retry_after }) = &result {
            self.arm_cooldown(*retry_after);
        }
        parse_verdict(&result?)
    }
}

/// Validates raw model output. Anything off-schema is rejected whole rather
/// than partially trusted.
pub fn parse_verdict(text: &str) -> Result<Assessment, AnalysisBackendError> {
    let mismatch = |message: String| AnalysisBackendError::SchemaMismatch { message };

    let verdict: Verdict =
        serde_json::from_str(strip_code_fences(text)).map_err(|e| mismatch(e.to_string()))?;

    if !(0..=100).contains(&verdict.health_score) {
        return Err(mismatch(format!(
            "health_score {} out of range",
            verdict.health_score
        )));
    }

    let mut issues = Vec::with_capacity(verdict.issues.len());
    let mut issue_advice = Vec::new();
    for issue in verdict.issues {
        if issue.category.trim().is_empty() || issue.description.trim().is_empty() {
            return Err(mismatch("issue with empty category or description".to_string()));
        }
        if let Some(rec) = issue.recommendation.filter(|r| !r.trim().is_empty()) {
            if !issue_advice.contains(&rec) {
                issue_advice.push(rec);
            }
        }
        issues.push(Issue {
            severity: issue.severity,
            category: issue.category.trim().to_string(),
            description: issue.description,
        });
    }

    let mut recommendations: Vec<String> = verdict
        .recommendations
        .into_iter()
        .filter(|r| !r.trim().is_empty())
        .collect();
    if recommendations.is_empty() {
        recommendations = issue_advice;
    }
    if recommendations.is_empty() {
        recommendations.push(rules::NO_ACTION.to_string());
    }

    let score = verdict.health_score as u8;
    let summary = verdict
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "Device health score is {}/100. Found {} issue(s) requiring attention.",
                score,
                issues.len()
            )
        });

    Ok(Assessment {
        score,
        summary,
        issues,
        recommendations,
        provenance: Provenance::Ai,
        fallback_reason: None,
    })
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}
