use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::openai::{self, ModelError};

pub const DEFAULT_MODELS: &[&str] = &["gpt-4.1-mini", "gpt-4o-mini", "gpt-4o"];

/// A hosted text model reachable by name.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        instructions: &str,
        input: &str,
    ) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(base_url: &str, api_key: String, temperature: f32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| anyhow::anyhow!("build OpenAI http client: {err}"))?;

        Ok(Self {
            client,
            endpoint: openai::responses_endpoint(base_url),
            api_key,
            temperature,
        })
    }

    pub fn from_env(base_url: &str, temperature: f32) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Self::new(base_url, api_key, temperature)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn generate(
        &self,
        model: &str,
        instructions: &str,
        input: &str,
    ) -> Result<String, ModelError> {
        openai::responses_text(
            &self.client,
            &self.endpoint,
            &self.api_key,
            model,
            instructions,
            input,
            self.temperature,
        )
        .await
    }
}

/// What the generator does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RetryOnce,
    Advance,
}

pub fn action_for(err: &ModelError) -> Action {
    match err {
        ModelError::RateLimited { .. } => Action::RetryOnce,
        ModelError::ModelUnavailable { .. }
        | ModelError::Api { .. }
        | ModelError::Network(_)
        | ModelError::Response(_) => Action::Advance,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointFailure {
    pub model: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { model: String, text: String },
    NoEndpointAvailable { failures: Vec<EndpointFailure> },
}

impl GenerationOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Generated { text, .. } => Some(text),
            GenerationOutcome::NoEndpointAvailable { .. } => None,
        }
    }
}

/// Sends prompts to a prioritized list of models, falling through on
/// failure. Never fails the caller: exhaustion is an outcome.
pub struct FindingsGenerator<B> {
    backend: B,
    models: Vec<String>,
    rate_limit_backoff: Duration,
}

impl<B: ModelBackend> FindingsGenerator<B> {
    pub fn new(backend: B, models: Vec<String>, rate_limit_backoff: Duration) -> Self {
        Self {
            backend,
            models,
            rate_limit_backoff,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub async fn generate(&self, instructions: &str, input: &str) -> GenerationOutcome {
        let mut failures = Vec::new();

        for model in &self.models {
            let mut attempts = 0u32;
            let mut retried = false;

            let error = loop {
                attempts += 1;
                tracing::debug!(model = %model, attempt = attempts, "findings request");
                let err = match self.backend.generate(model, instructions, input).await {
                    Ok(text) => {
                        tracing::info!(model = %model, attempts, "findings generated");
                        return GenerationOutcome::Generated {
                            model: model.clone(),
                            text,
                        };
                    }
                    Err(err) => err,
                };

                match action_for(&err) {
                    Action::RetryOnce if !retried => {
                        retried = true;
                        tracing::warn!(
                            model = %model,
                            backoff_ms = self.rate_limit_backoff.as_millis() as u64,
                            %err,
                            "rate limited; retrying once"
                        );
                        if !self.rate_limit_backoff.is_zero() {
                            tokio::time::sleep(self.rate_limit_backoff).await;
                        }
                    }
                    _ => break err,
                }
            };

            tracing::warn!(model = %model, %error, "model failed; trying next");
            failures.push(EndpointFailure {
                model: model.clone(),
                attempts,
                error: error.to_string(),
            });
        }

        tracing::error!(models = self.models.len(), "no model endpoint available");
        GenerationOutcome::NoEndpointAvailable { failures }
    }

    pub async fn summarize(&self, digest: &str) -> GenerationOutcome {
        self.generate(SUMMARY_INSTRUCTIONS, &wrap_digest(digest))
            .await
    }

    pub async fn remediation_table(&self, digest: &str) -> GenerationOutcome {
        self.generate(TABLE_INSTRUCTIONS, &wrap_digest(digest))
            .await
    }
}

fn wrap_digest(digest: &str) -> String {
    format!("BEGIN_CRAWL_DATA\n{digest}\nEND_CRAWL_DATA")
}

const SUMMARY_INSTRUCTIONS: &str = "You are a senior technical SEO auditor.\n\
Task: Review the crawl data (one line per page: URL, Title, H1, Description; MISSING marks an absent tag).\n\
\n\
Output:\n\
- Name the top 3 critical errors, most severe first.\n\
- For each: a short name, a severity (High, Medium or Low) and a one-paragraph description citing the affected URLs.\n\
- Finish with a short 'Summary Action Required' paragraph.\n\
- Use Markdown. Do not invent pages that are not in the crawl data.\n";

const TABLE_INSTRUCTIONS: &str = "You are a senior technical SEO auditor.\n\
Task: Find every on-page SEO issue in the crawl data (one line per page: URL, Title, H1, Description; MISSING marks an absent tag).\n\
\n\
Output format (strict):\n\
- One issue per line, fields separated by ' | ' in this order:\n\
  URL | Error_Type | Current_Value | Recommended_Fix | Priority\n\
- Priority is one of High, Medium, Low.\n\
- Do not use the '|' character inside a field.\n\
- No header line, no numbering, no code fences, no commentary.\n";

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed script of responses and records which model each call used.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, ModelError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for &ScriptedBackend {
        async fn generate(
            &self,
            model: &str,
            _instructions: &str,
            input: &str,
        ) -> Result<String, ModelError> {
            assert!(input.starts_with("BEGIN_CRAWL_DATA\n"));
            self.calls.lock().unwrap().push(model.to_owned());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Network("script exhausted".to_owned())))
        }
    }

    fn rate_limited() -> Result<String, ModelError> {
        Err(ModelError::RateLimited {
            message: "429".to_owned(),
        })
    }

    fn unavailable() -> Result<String, ModelError> {
        Err(ModelError::ModelUnavailable {
            status: 404,
            message: "no such model".to_owned(),
        })
    }

    fn generator(backend: &ScriptedBackend) -> FindingsGenerator<&ScriptedBackend> {
        FindingsGenerator::new(
            backend,
            vec!["first".to_owned(), "second".to_owned()],
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn first_model_success_is_returned() {
        let backend = ScriptedBackend::new(vec![Ok("findings".to_owned())]);
        let outcome = generator(&backend).summarize("URL: x").await;

        assert_eq!(
            outcome,
            GenerationOutcome::Generated {
                model: "first".to_owned(),
                text: "findings".to_owned()
            }
        );
        assert_eq!(backend.calls(), vec!["first"]);
    }

    #[tokio::test]
    async fn rate_limit_retries_same_model_once() {
        let backend = ScriptedBackend::new(vec![rate_limited(), Ok("after retry".to_owned())]);
        let outcome = generator(&backend).summarize("URL: x").await;

        assert_eq!(outcome.text(), Some("after retry"));
        assert_eq!(backend.calls(), vec!["first", "first"]);
    }

    #[tokio::test]
    async fn second_rate_limit_advances_to_next_model() {
        let backend = ScriptedBackend::new(vec![
            rate_limited(),
            rate_limited(),
            Ok("from second".to_owned()),
        ]);
        let outcome = generator(&backend).remediation_table("URL: x").await;

        assert_eq!(
            outcome,
            GenerationOutcome::Generated {
                model: "second".to_owned(),
                text: "from second".to_owned()
            }
        );
        assert_eq!(backend.calls(), vec!["first", "first", "second"]);
    }

    #[tokio::test]
    async fn unavailable_model_advances_without_retry() {
        let backend = ScriptedBackend::new(vec![unavailable(), Ok("ok".to_owned())]);
        let outcome = generator(&backend).summarize("URL: x").await;

        assert_eq!(outcome.text(), Some("ok"));
        assert_eq!(backend.calls(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn exhaustion_is_an_outcome_with_every_failure() {
        let backend = ScriptedBackend::new(vec![
            unavailable(),
            rate_limited(),
            Err(ModelError::Api {
                status: 500,
                message: "boom".to_owned(),
            }),
        ]);
        let outcome = generator(&backend).summarize("URL: x").await;

        let GenerationOutcome::NoEndpointAvailable { failures } = outcome else {
            panic!("expected exhaustion, got {outcome:?}");
        };
        assert_eq!(
            failures
                .iter()
                .map(|f| (f.model.as_str(), f.attempts))
                .collect::<Vec<_>>(),
            vec![("first", 1), ("second", 2)]
        );
        assert!(failures[1].error.contains("boom"));
        assert_eq!(backend.calls(), vec!["first", "second", "second"]);
    }

    #[tokio::test]
    async fn empty_model_list_is_exhausted_immediately() {
        let backend = ScriptedBackend::new(vec![]);
        let generator = FindingsGenerator::new(&backend, Vec::new(), Duration::ZERO);

        assert_eq!(
            generator.summarize("URL: x").await,
            GenerationOutcome::NoEndpointAvailable {
                failures: Vec::new()
            }
        );
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn policy_table() {
        assert_eq!(
            action_for(&ModelError::RateLimited {
                message: String::new()
            }),
            Action::RetryOnce
        );
        assert_eq!(
            action_for(&ModelError::ModelUnavailable {
                status: 404,
                message: String::new()
            }),
            Action::Advance
        );
        assert_eq!(
            action_for(&ModelError::Network(String::new())),
            Action::Advance
        );
    }
}
