//! Request, response, and decision types for the answer pipeline.

use colloquy_core::AppResult;
use serde::{Deserialize, Serialize};

/// Inbound question for a tenant.
///
/// `session_id` absent means a stateless, memory-less call. The optional
/// flags override the configured defaults for this request only;
/// `complexity_score` and `pricing_intent` let a caller that already ran
/// its own classification pass pre-computed signals through.
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub tenant_id: String,
    pub query: String,
    pub session_id: Option<String>,
    pub use_hyde: Option<bool>,
    pub use_rerank: Option<bool>,
    pub provider: Option<String>,
    pub complexity_score: Option<i32>,
    pub pricing_intent: Option<bool>,
    pub external_context: Option<String>,
}

impl AnswerRequest {
    /// Create a request with the required fields.
    pub fn new(tenant_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    /// Attach a session for conversation memory.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Override the HyDE query-expansion flag.
    pub fn with_hyde(mut self, use_hyde: bool) -> Self {
        self.use_hyde = Some(use_hyde);
        self
    }

    /// Override the rerank flag.
    pub fn with_rerank(mut self, use_rerank: bool) -> Self {
        self.use_rerank = Some(use_rerank);
        self
    }

    /// Force a specific provider for every model call in this request.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Supply pre-fetched supplemental context (e.g. a live pricing feed).
    pub fn with_external_context(mut self, context: impl Into<String>) -> Self {
        self.external_context = Some(context.into());
        self
    }
}

/// Outcome of an answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// The user-facing answer text
    pub answer: String,

    /// The conversation should be escalated to a human operator
    pub requires_human: bool,

    /// Echo of the session this exchange was recorded under
    pub session_id: Option<String>,

    /// The retrieved context the answer was synthesized from (empty for
    /// small talk and handoff)
    pub context_used: String,
}

/// A retrieved chunk competing for a spot in the synthesis context.
///
/// Ephemeral: candidates never outlive the query invocation that produced
/// them and are never cached across turns.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk_id: String,
    pub filename: String,
    pub content: String,

    /// Fused rank signal (reciprocal rank fusion score)
    pub score: f64,

    /// LLM-assigned relevance 0-10, present only after reranking
    pub rerank_score: Option<i64>,
}

/// Structured routing decision from the intent classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDecision {
    #[serde(default = "default_true")]
    pub requires_rag: bool,

    #[serde(default)]
    pub requires_human: bool,

    #[serde(default = "default_complexity")]
    pub complexity_score: i32,

    #[serde(default)]
    pub pricing_intent: bool,

    #[serde(default)]
    pub reason: String,
}

fn default_true() -> bool {
    true
}

fn default_complexity() -> i32 {
    5
}

impl IntentDecision {
    /// Conservative decision used when the classifier's output is
    /// unusable: treat the message as a real question, never as a handoff.
    pub fn fallback() -> Self {
        Self {
            requires_rag: true,
            requires_human: false,
            complexity_score: default_complexity(),
            pricing_intent: false,
            reason: "classifier output unusable; defaulting to retrieval".to_string(),
        }
    }

    /// Generation step for this decision: complex questions route to the
    /// stronger model.
    pub fn generation_step(&self) -> &'static str {
        if self.complexity_score >= 7 {
            "complex_reasoning"
        } else {
            "generation"
        }
    }
}

/// Verdict from the answer grader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grade {
    /// 1 = acceptable, 0 = hallucinated/irrelevant
    pub score: u8,

    #[serde(default)]
    pub reason: String,
}

impl Grade {
    pub fn passed(&self) -> bool {
        self.score != 0
    }

    /// Verdict used when the grading output is unusable: accept. A grading
    /// outage must not suppress every answer.
    pub fn accept_by_default() -> Self {
        Self {
            score: 1,
            reason: "grading output unusable; accepting answer".to_string(),
        }
    }
}

/// External provider of supplemental context (e.g. a live pricing feed).
///
/// The engine treats the fetched text as untrusted prose to place verbatim
/// in the prompt; never as structured data to parse.
#[async_trait::async_trait]
pub trait SupplementalSource: Send + Sync {
    async fn fetch(&self, identifier: &str, query: Option<&str>) -> AppResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = AnswerRequest::new("tenant-a", "what is the refund window?")
            .with_session("session-1")
            .with_hyde(true)
            .with_rerank(false);

        assert_eq!(request.tenant_id, "tenant-a");
        assert_eq!(request.session_id.as_deref(), Some("session-1"));
        assert_eq!(request.use_hyde, Some(true));
        assert_eq!(request.use_rerank, Some(false));
        assert!(request.provider.is_none());
    }

    #[test]
    fn test_intent_fallback_is_conservative() {
        let decision = IntentDecision::fallback();
        assert!(decision.requires_rag);
        assert!(!decision.requires_human);
    }

    #[test]
    fn test_generation_step_routing() {
        let mut decision = IntentDecision::fallback();
        assert_eq!(decision.generation_step(), "generation");

        decision.complexity_score = 7;
        assert_eq!(decision.generation_step(), "complex_reasoning");
    }

    #[test]
    fn test_intent_decision_partial_json_defaults() {
        let decision: IntentDecision = serde_json::from_str("{\"requires_human\": false}").unwrap();
        assert!(decision.requires_rag);
        assert_eq!(decision.complexity_score, 5);
    }

    #[test]
    fn test_grade_pass() {
        assert!(Grade {
            score: 1,
            reason: String::new()
        }
        .passed());
        assert!(!Grade {
            score: 0,
            reason: String::new()
        }
        .passed());
        assert!(Grade::accept_by_default().passed());
    }
}
