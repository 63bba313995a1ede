use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum ModelBehavior {
    /// Answer every prompt.
    Answer,
    /// `404` with an OpenAI-style "model does not exist" body.
    Missing,
    /// `429` on the first call for this model, then answer.
    RateLimitedOnce,
    /// `429` on every call.
    AlwaysRateLimited,
}

#[derive(Debug, Clone, Default)]
pub struct OpenAiStubConfig {
    /// Models not listed here answer normally.
    pub models: HashMap<String, ModelBehavior>,
}

pub struct OpenAiStub {
    pub base_url: String,
    calls: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_for_server = Arc::clone(&calls);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let model = parsed
                    .get("model")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_owned();
                let previous_calls = {
                    let mut calls = calls_for_server.lock().expect("lock calls");
                    let previous = calls.iter().filter(|m| **m == model).count();
                    calls.push(model.clone());
                    previous
                };

                let behavior = config
                    .models
                    .get(&model)
                    .copied()
                    .unwrap_or(ModelBehavior::Answer);
                let failure = match behavior {
                    ModelBehavior::Missing => Some((
                        404,
                        format!("The model `{model}` does not exist or you do not have access to it."),
                    )),
                    ModelBehavior::RateLimitedOnce if previous_calls == 0 => {
                        Some((429, "Rate limit reached for requests".to_owned()))
                    }
                    ModelBehavior::AlwaysRateLimited => {
                        Some((429, "Rate limit reached for requests".to_owned()))
                    }
                    _ => None,
                };
                if let Some((status, message)) = failure {
                    let error_body = serde_json::json!({
                        "error": { "message": message, "type": "invalid_request_error" }
                    });
                    let _ = request.respond(
                        tiny_http::Response::from_string(error_body.to_string())
                            .with_status_code(status),
                    );
                    continue;
                }

                let instructions = parsed
                    .get("instructions")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let Some(input) = parsed.get("input").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing input").with_status_code(400),
                    );
                    continue;
                };

                let output_text = if instructions.contains("Output format (strict)") {
                    table_response(input)
                } else {
                    format!("Top 3 critical errors (model {model})")
                };

                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": model,
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ],
                    "output_text": output_text
                });

                let mut response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                response = response.with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            calls,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Model names in the order requests arrived.
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock calls").clone()
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One `Missing Description` row per crawled page whose description is MISSING.
fn table_response(input: &str) -> String {
    let mut rows = vec!["URL | Error_Type | Current_Value | Recommended_Fix | Priority".to_owned()];
    for line in input.lines() {
        let Some(rest) = line.strip_prefix("URL: ") else {
            continue;
        };
        let Some((url, _)) = rest.split_once(" | ") else {
            continue;
        };
        if line.ends_with("Description: MISSING") {
            rows.push(format!(
                "{url} | Metadata - Missing Description | MISSING | Write a unique description, with commas | High"
            ));
        }
    }
    format!("```\n{}\n```", rows.join("\n"))
}
