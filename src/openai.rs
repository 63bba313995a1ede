use reqwest::StatusCode;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Failure talking to a hosted model, classified so callers can decide
/// whether to retry, move to the next model or give up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },
    #[error("model unavailable ({status}): {message}")]
    ModelUnavailable { status: u16, message: String },
    #[error("OpenAI API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Response(String),
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

pub async fn responses_text(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    model: &str,
    instructions: &str,
    input: &str,
    temperature: f32,
) -> Result<String, ModelError> {
    let mut body = serde_json::json!({
        "model": model,
        "instructions": instructions,
        "input": input,
        "text": { "format": { "type": "text" } },
        "store": false,
    });

    // NOTE: Some GPT-5 models reject sampling params like `temperature`.
    if !model.starts_with("gpt-5")
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("temperature".to_owned(), serde_json::json!(temperature));
    }

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| ModelError::Network(format!("POST {endpoint}: {err}")))?;

    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|err| ModelError::Network(format!("read OpenAI response body: {err}")))?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        return Err(classify_error(status, message));
    }

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| ModelError::Response(format!("parse OpenAI response: {err}")))?;
    extract_output_text(&value)
}

pub fn classify_error(status: StatusCode, message: String) -> ModelError {
    let lower = message.to_ascii_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("rate limit")
        || lower.contains("quota")
    {
        return ModelError::RateLimited { message };
    }

    let names_model = lower.contains("model");
    let unavailable = lower.contains("does not exist")
        || lower.contains("not found")
        || lower.contains("not supported")
        || lower.contains("unsupported")
        || lower.contains("do not have access");
    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && names_model && unavailable)
    {
        return ModelError::ModelUnavailable {
            status: status.as_u16(),
            message,
        };
    }

    ModelError::Api {
        status: status.as_u16(),
        message,
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_output_text(value: &serde_json::Value) -> Result<String, ModelError> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ModelError::Response("missing `output` array in response".to_owned()))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            if let Some(part_text) = part.get("text").and_then(|v| v.as_str()) {
                text.push_str(part_text);
            }
        }
    }

    if text.trim().is_empty() {
        return Err(ModelError::Response("OpenAI output text is empty".to_owned()));
    }
    Ok(text)
}
