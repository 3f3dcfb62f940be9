//! Provider registry with per-step model routing.
//!
//! The registry replaces an ad-hoc global client cache with an explicit,
//! injected component: clients are constructed lazily on first use, cached
//! per `(step, provider, model)`, and shared read-mostly across concurrent
//! requests. Provider selection falls back deterministically to the default
//! provider when a requested provider's credentials are missing, so a bad
//! per-request override degrades instead of failing the question.

use crate::client::{LlmClient, LlmRequest};
use crate::providers::{GeminiClient, OllamaClient, OpenAiClient};
use colloquy_core::config::AppConfig;
use colloquy_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Timeout classes applied to outbound model calls.
///
/// Generation-class steps get the generous timeout; retrieval-class steps
/// (contextualization, intent, search helpers, grading, embedding) get the
/// short one. A timeout surfaces as an ordinary `AppError::Llm` at the call
/// site, which every pipeline stage already treats as its failure path.
#[derive(Debug, Clone, Copy)]
pub struct StepTimeouts {
    pub generation: Duration,
    pub retrieval: Duration,
}

impl StepTimeouts {
    fn for_step(&self, step: &str) -> Duration {
        match step {
            "generation" | "complex_reasoning" => self.generation,
            _ => self.retrieval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    step: String,
    provider: String,
    model: String,
}

impl ClientKey {
    fn new(step: &str, provider: &str, model: Option<&str>) -> Self {
        Self {
            step: step.to_string(),
            provider: provider.to_string(),
            model: model.unwrap_or_default().to_string(),
        }
    }
}

/// Registry of initialized LLM clients, keyed by `(step, provider, model)`.
pub struct ProviderRegistry {
    default_provider: String,
    default_model: Option<String>,
    routes: HashMap<String, (String, Option<String>)>,
    timeouts: StepTimeouts,
    clients: RwLock<HashMap<ClientKey, Arc<dyn LlmClient>>>,
}

impl ProviderRegistry {
    /// Build a registry from the application configuration.
    pub fn new(config: &AppConfig) -> Self {
        let mut routes = HashMap::new();
        for step in colloquy_core::config::KNOWN_STEPS {
            routes.insert(step.to_string(), config.route_for_step(step));
        }

        Self {
            default_provider: config.provider.clone(),
            default_model: config.model.clone(),
            routes,
            timeouts: StepTimeouts {
                generation: Duration::from_secs(config.engine.generation_timeout_secs),
                retrieval: Duration::from_secs(config.engine.retrieval_timeout_secs),
            },
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Pre-register a client for a `(step, provider, model)` key.
    ///
    /// Used by callers that construct clients themselves (tests, embedded
    /// deployments with custom transports).
    pub fn register(
        &self,
        step: &str,
        provider: &str,
        model: Option<&str>,
        client: Arc<dyn LlmClient>,
    ) {
        let key = ClientKey::new(step, provider, model);
        self.clients
            .write()
            .expect("client cache lock poisoned")
            .insert(key, client);
    }

    /// Resolve the client for a step, honoring per-request overrides.
    ///
    /// Resolution order for the provider: request override > step route >
    /// default. When the chosen provider cannot be constructed for lack of
    /// credentials, resolution retries once with the default provider.
    pub fn client_for(
        &self,
        step: &str,
        provider_override: Option<&str>,
        model_override: Option<&str>,
    ) -> AppResult<(Arc<dyn LlmClient>, Option<String>)> {
        let (routed_provider, routed_model) = self
            .routes
            .get(step)
            .cloned()
            .unwrap_or_else(|| (self.default_provider.clone(), self.default_model.clone()));

        let provider = provider_override.unwrap_or(&routed_provider).to_string();
        let model = model_override
            .map(|m| m.to_string())
            .or(routed_model.clone());

        let key = ClientKey::new(step, &provider, model.as_deref());

        if let Some(client) = self
            .clients
            .read()
            .expect("client cache lock poisoned")
            .get(&key)
        {
            return Ok((Arc::clone(client), model));
        }

        let timeout = self.timeouts.for_step(step);
        let (client, model) = match create_client(&provider, model.clone(), timeout) {
            Ok(client) => (client, model),
            // Missing credentials on a known provider degrade to the default;
            // an unknown provider name is a caller bug and stays an error.
            Err(AppError::Config(reason))
                if provider != self.default_provider && is_known_provider(&provider) =>
            {
                tracing::warn!(
                    "Provider '{}' unavailable for step '{}' ({}); falling back to '{}'",
                    provider,
                    step,
                    reason,
                    self.default_provider
                );
                let fallback_model = self.default_model.clone();
                let client = create_client(&self.default_provider, fallback_model.clone(), timeout)?;
                (client, fallback_model)
            }
            Err(e) => return Err(e),
        };

        // Double-checked insert: a concurrent task may have constructed the
        // same client while we were outside the lock. First write wins.
        let mut cache = self.clients.write().expect("client cache lock poisoned");
        let entry = cache.entry(key).or_insert_with(|| Arc::clone(&client));
        Ok((Arc::clone(entry), model))
    }

    /// Complete a prompt on the client routed for `step`.
    ///
    /// Returns the generated text. Model resolution: request model (if set) >
    /// step route > provider default.
    pub async fn complete(
        &self,
        step: &str,
        provider_override: Option<&str>,
        request: LlmRequest,
    ) -> AppResult<String> {
        let (client, routed_model) =
            self.client_for(step, provider_override, request.model.as_deref())?;

        let mut request = request;
        if request.model.is_none() {
            request.model = routed_model;
        }

        let response = client.complete(&request).await?;
        Ok(response.content)
    }

    /// Embed text using the client routed for the `embedding` step.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let (client, _model) = self.client_for("embedding", None, None)?;
        client.embed(text).await
    }
}

/// Check whether a provider name maps to a concrete implementation.
fn is_known_provider(provider: &str) -> bool {
    matches!(
        provider.to_lowercase().as_str(),
        "ollama" | "openai" | "gemini" | "google"
    )
}

/// Construct a concrete client for a provider name.
fn create_client(
    provider: &str,
    model: Option<String>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = std::env::var("OLLAMA_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:11434".to_string());
            Ok(Arc::new(OllamaClient::with_options(
                base_url,
                model,
                Some(timeout),
            )))
        }
        "openai" => Ok(Arc::new(OpenAiClient::from_env(model, Some(timeout))?)),
        "gemini" | "google" => Ok(Arc::new(GeminiClient::from_env(model, Some(timeout))?)),
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
