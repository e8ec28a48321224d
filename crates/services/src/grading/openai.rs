use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use grader_core::model::GradeStatus;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{GradeRequest, GradeVerdict, GradingService, build_task_prompt};
use crate::error::GradingError;
use crate::units::UnitProvider;

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiGraderConfig {
    pub base_url: String,
    /// Used when a request carries no key of its own.
    pub api_key: Option<String>,
}

impl Default for OpenAiGraderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
        }
    }
}

/// Grades submissions by prompting an LLM with the question's reference
/// material.
#[derive(Clone)]
pub struct OpenAiGrader {
    client: Client,
    config: OpenAiGraderConfig,
    units: Arc<dyn UnitProvider>,
}

impl OpenAiGrader {
    #[must_use]
    pub fn new(config: OpenAiGraderConfig, units: Arc<dyn UnitProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            units,
        }
    }

    fn api_key<'a>(&'a self, request: &'a GradeRequest) -> Option<&'a str> {
        request
            .api_key
            .as_deref()
            .or(self.config.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// `gpt-5-mini` only accepts the default temperature.
fn temperature_for(model: &str) -> f32 {
    if model.starts_with("gpt-5-mini") { 1.0 } else { 0.0 }
}

#[async_trait]
impl GradingService for OpenAiGrader {
    async fn grade(&self, request: &GradeRequest) -> Result<GradeVerdict, GradingError> {
        let api_key = self.api_key(request).ok_or(GradingError::MissingApiKey)?;

        let unit = self.units.get_unit(&request.unit).await?;
        let question = unit
            .question(&request.qtag)
            .ok_or_else(|| GradingError::UnknownQuestion {
                unit: request.unit.clone(),
                qtag: request.qtag.clone(),
            })?;

        let prompt = build_task_prompt(question, &request.student_solution, &request.part);
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: temperature_for(&request.model),
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        info!(
            unit = %request.unit,
            qtag = %request.qtag,
            part = %request.part,
            model = %request.model,
            "calling grading model"
        );
        let started = Instant::now();

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GradingError::Timeout(request.timeout)
                } else {
                    GradingError::Http(err)
                }
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "grading request rejected");
            return Err(GradingError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                GradingError::Timeout(request.timeout)
            } else {
                GradingError::Http(err)
            }
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GradingError::EmptyResponse)?;

        debug!(elapsed_ms = started.elapsed().as_millis(), "grading model responded");
        parse_verdict(&content)
    }
}

/// Parse model output into a verdict.
///
/// Accepts bare JSON, JSON wrapped in a code fence, or JSON embedded in
/// surrounding prose. Unknown `result` values are normalized by substring
/// match, falling back to `error`.
///
/// # Errors
///
/// Returns `GradingError::MalformedResponse` if no JSON object with the
/// three verdict fields can be found.
pub fn parse_verdict(content: &str) -> Result<GradeVerdict, GradingError> {
    let stripped = strip_code_fences(content);
    let raw: RawVerdict = match serde_json::from_str(stripped) {
        Ok(raw) => raw,
        Err(first_err) => {
            let embedded = first_json_object(stripped).ok_or_else(|| {
                GradingError::MalformedResponse(format!("no JSON object found: {first_err}"))
            })?;
            serde_json::from_str(embedded)
                .map_err(|err| GradingError::MalformedResponse(err.to_string()))?
        }
    };

    Ok(GradeVerdict {
        result: normalize_result(&raw.result),
        feedback: raw.feedback,
        full_explanation: raw.full_explanation,
    })
}

fn normalize_result(raw: &str) -> GradeStatus {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "pass" => GradeStatus::Pass,
        "fail" => GradeStatus::Fail,
        "error" => GradeStatus::Error,
        other if other.contains("pass") => GradeStatus::Pass,
        other if other.contains("fail") => GradeStatus::Fail,
        _ => GradeStatus::Error,
    }
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// First balanced `{...}` span, skipping braces inside string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    result: String,
    full_explanation: String,
    feedback: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::InMemoryUnitProvider;
    use grader_core::model::{PartLabel, Qtag, UnitId};

    fn request(api_key: Option<&str>) -> GradeRequest {
        GradeRequest {
            unit: UnitId::new("unit1"),
            qtag: Qtag::new("q1"),
            student_solution: "x".into(),
            part: PartLabel::all(),
            model: "gpt-4.1-mini".into(),
            api_key: api_key.map(str::to_string),
            timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn parses_bare_json() {
        let verdict = parse_verdict(
            r#"{"result":"pass","full_explanation":"All steps right.","feedback":"Nice."}"#,
        )
        .unwrap();
        assert_eq!(verdict.result, GradeStatus::Pass);
        assert_eq!(verdict.feedback, "Nice.");
        assert_eq!(verdict.full_explanation, "All steps right.");
    }

    #[test]
    fn parses_fenced_json() {
        let content = "```json\n{\"result\":\"fail\",\"full_explanation\":\"e\",\"feedback\":\"f\"}\n```";
        assert_eq!(parse_verdict(content).unwrap().result, GradeStatus::Fail);
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let content = "Here is my grade: {\"result\":\"PASS\",\"full_explanation\":\"uses {x}\",\"feedback\":\"ok\"} thanks";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.result, GradeStatus::Pass);
        assert_eq!(verdict.full_explanation, "uses {x}");
    }

    #[test]
    fn normalizes_unexpected_results() {
        assert_eq!(normalize_result("Passed"), GradeStatus::Pass);
        assert_eq!(normalize_result("failure"), GradeStatus::Fail);
        assert_eq!(normalize_result("unsure"), GradeStatus::Error);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = parse_verdict(r#"{"result":"pass"}"#).unwrap_err();
        assert!(matches!(err, GradingError::MalformedResponse(_)));
        assert!(matches!(
            parse_verdict("no json here"),
            Err(GradingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn temperature_depends_on_model() {
        assert!((temperature_for("gpt-5-mini-2025") - 1.0).abs() < f32::EPSILON);
        assert!(temperature_for("gpt-4.1-mini").abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let grader = OpenAiGrader::new(
            OpenAiGraderConfig::default(),
            Arc::new(InMemoryUnitProvider::default()),
        );
        let err = grader.grade(&request(Some("  "))).await.unwrap_err();
        assert!(matches!(err, GradingError::MissingApiKey));
    }

    #[tokio::test]
    async fn unknown_unit_is_reported() {
        let grader = OpenAiGrader::new(
            OpenAiGraderConfig {
                api_key: Some("sk-test".into()),
                ..OpenAiGraderConfig::default()
            },
            Arc::new(InMemoryUnitProvider::default()),
        );
        let err = grader.grade(&request(None)).await.unwrap_err();
        assert!(matches!(err, GradingError::Units(_)));
    }
}
