//! End-to-end pipeline tests against a scripted in-process model client.
//!
//! The mock client routes on distinctive prompt fragments, so one client
//! serves every pipeline step. Answer-synthesis prompts are echoed back by
//! default, which lets tests inspect exactly what context and question the
//! synthesizer saw.

use colloquy_core::config::{AppConfig, KNOWN_STEPS};
use colloquy_core::AppResult;
use colloquy_engine::storage::DocumentStore;
use colloquy_engine::types::SupplementalSource;
use colloquy_engine::{intent, rerank, AnswerRequest, Engine, IntentDecision, RetrievalCandidate};
use colloquy_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, ProviderRegistry};
use colloquy_memory::{MemoryStore, TurnRole};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PASS_GRADE: &str = "{\"score\": 1, \"reason\": \"grounded\"}";
const FAIL_GRADE: &str = "{\"score\": 0, \"reason\": \"not supported by context\"}";

#[derive(Default)]
struct MockLlm {
    /// Raw classifier output (possibly invalid JSON)
    intent_json: Mutex<String>,
    /// Scripted grade outputs; empty queue falls back to a pass
    grades: Mutex<VecDeque<&'static str>>,
    /// Forced output for answer-synthesis prompts (default: echo the prompt)
    answer_override: Mutex<Option<String>>,
    /// Forced output for contextualization prompts
    contextualized: Mutex<Option<String>>,
    grade_calls: AtomicUsize,
    rewrite_calls: AtomicUsize,
    answer_calls: AtomicUsize,
}

impl MockLlm {
    fn new() -> Arc<Self> {
        let mock = Self::default();
        *mock.intent_json.lock().unwrap() =
            "{\"requires_rag\": true, \"requires_human\": false, \"complexity_score\": 4, \
             \"pricing_intent\": false, \"reason\": \"factual question\"}"
                .to_string();
        Arc::new(mock)
    }

    fn set_intent(&self, raw: &str) {
        *self.intent_json.lock().unwrap() = raw.to_string();
    }

    fn script_grades(&self, grades: &[&'static str]) {
        *self.grades.lock().unwrap() = grades.iter().copied().collect();
    }

    fn set_answer(&self, answer: &str) {
        *self.answer_override.lock().unwrap() = Some(answer.to_string());
    }

    fn set_contextualized(&self, standalone: &str) {
        *self.contextualized.lock().unwrap() = Some(standalone.to_string());
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let prompt = &request.prompt;

        let content = if prompt.contains("You are a router") {
            self.intent_json.lock().unwrap().clone()
        } else if prompt.contains("quality control auditor") {
            self.grade_calls.fetch_add(1, Ordering::SeqCst);
            self.grades
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PASS_GRADE)
                .to_string()
        } else if prompt.contains("optimizes search queries") {
            self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
            "refund policy duration in days".to_string()
        } else if prompt.contains("Standalone Question:") {
            self.contextualized
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "standalone question".to_string())
        } else if prompt.contains("relevance ranking system") {
            if prompt.contains("MARK_RELEVANT") {
                "{\"score\": 9}".to_string()
            } else {
                "asdf{not json".to_string()
            }
        } else if prompt.contains("does not have to be factually true") {
            "Our policy allows returns within a generous window.".to_string()
        } else if prompt.contains("asked to speak to a human agent") {
            "I am notifying a human agent to take over.".to_string()
        } else if prompt.contains("does not require looking anything up") {
            "Hello! How can I help you today?".to_string()
        } else if prompt.contains("<retrieved_context>") {
            self.answer_calls.fetch_add(1, Ordering::SeqCst);
            match self.answer_override.lock().unwrap().clone() {
                Some(answer) => answer,
                // Echo the history/context/question portion of the prompt;
                // the instruction block is skipped because it contains the
                // literal handoff tag and would trip escalation detection.
                None => prompt[prompt.find("<chat_history>").unwrap()..].to_string(),
            }
        } else {
            panic!("Mock received an unrecognized prompt: {}", prompt);
        };

        Ok(LlmResponse {
            content,
            model: "mock".to_string(),
            usage: LlmUsage::default(),
        })
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        // Deterministic toy embedding: byte histogram over 8 buckets.
        let mut vector = vec![0.0f32; 8];
        for byte in text.bytes() {
            vector[(byte % 8) as usize] += 1.0;
        }
        Ok(vector)
    }
}

struct Fixture {
    engine: Engine,
    mock: Arc<MockLlm>,
    tenant_id: String,
}

fn fixture_with_config(mut config: AppConfig) -> Fixture {
    config.provider = "ollama".to_string();

    let mock = MockLlm::new();
    let registry = ProviderRegistry::new(&config);
    for step in KNOWN_STEPS {
        registry.register(step, "ollama", None, mock.clone());
    }

    let documents = DocumentStore::open_in_memory().unwrap();
    let memory = MemoryStore::open_in_memory().unwrap();
    let tenant_id = documents.create_tenant("acme", Some("en")).unwrap();

    let engine = Engine::new(config, Arc::new(registry), documents, memory).unwrap();

    Fixture {
        engine,
        mock,
        tenant_id,
    }
}

fn fixture() -> Fixture {
    fixture_with_config(AppConfig::default())
}

#[tokio::test]
async fn refund_scenario_retrieves_and_references_the_chunk() {
    let fx = fixture();
    fx.engine
        .ingest_document(&fx.tenant_id, "refunds.md", "Our refund window is 30 days.")
        .await
        .unwrap();

    let response = fx
        .engine
        .answer(
            AnswerRequest::new(&fx.tenant_id, "what's your return policy?")
                .with_hyde(false)
                .with_rerank(false),
        )
        .await
        .unwrap();

    // The only chunk is the top (only) candidate...
    assert!(response.context_used.contains("Source: refunds.md"));
    assert!(response.context_used.contains("refund window is 30 days"));
    // ...and the synthesizer saw it (echoed prompt includes the context).
    assert!(response.answer.contains("30 days"));
    assert!(!response.requires_human);
}

#[tokio::test]
async fn empty_corpus_still_answers() {
    let fx = fixture();

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "what is the meaning of life?"))
        .await
        .unwrap();

    assert!(!response.answer.is_empty());
    assert!(response
        .context_used
        .contains("No relevant documents or live data found."));
}

#[tokio::test]
async fn retry_bound_is_exact() {
    let mut config = AppConfig::default();
    config.engine.max_retries = 2;
    let fx = fixture_with_config(config);

    fx.engine
        .ingest_document(&fx.tenant_id, "doc.md", "Some content.")
        .await
        .unwrap();

    // Grader fails every attempt: initial + 2 retries = 3 grades, 2 rewrites.
    fx.mock.script_grades(&[FAIL_GRADE, FAIL_GRADE, FAIL_GRADE]);
    fx.mock.set_answer("best available answer");

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "unanswerable question"))
        .await
        .unwrap();

    assert_eq!(fx.mock.grade_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fx.mock.rewrite_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.mock.answer_calls.load(Ordering::SeqCst), 3);
    // Graceful degradation: the last synthesized answer is delivered.
    assert_eq!(response.answer, "best available answer");
    assert!(!response.requires_human);
}

#[tokio::test]
async fn retry_loop_persists_only_the_delivered_exchange() {
    let mut config = AppConfig::default();
    config.engine.max_retries = 1;
    let fx = fixture_with_config(config);

    let session = fx.engine.memory().create_session(&fx.tenant_id).unwrap();
    fx.engine
        .ingest_document(&fx.tenant_id, "doc.md", "Some content.")
        .await
        .unwrap();

    fx.mock.script_grades(&[FAIL_GRADE, PASS_GRADE]);
    fx.mock.set_answer("final answer");

    fx.engine
        .answer(AnswerRequest::new(&fx.tenant_id, "original question").with_session(&session))
        .await
        .unwrap();

    let transcript = fx.engine.memory().full_transcript(&session).unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, TurnRole::User);
    assert_eq!(transcript[0].content, "original question");
    assert_eq!(transcript[1].role, TurnRole::Ai);
    assert_eq!(transcript[1].content, "final answer");
}

#[tokio::test]
async fn unparseable_intent_falls_back_to_retrieval() {
    let fx = fixture();
    fx.mock.set_intent("asdf{not json");

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "a real question"))
        .await
        .unwrap();

    // The fallback decision routes to RAG, never to handoff.
    assert!(!response.requires_human);
    assert!(response.context_used.contains("No relevant documents"));
}

#[tokio::test]
async fn classifier_fallback_decision_is_conservative() {
    let fx = fixture();
    fx.mock.set_intent("asdf{not json");

    let registry = ProviderRegistry::new(&AppConfig::default());
    for step in KNOWN_STEPS {
        registry.register(step, "ollama", None, fx.mock.clone());
    }
    let prompts = colloquy_engine::prompts::PromptSet::new().unwrap();

    let decision = intent::classify_intent(&registry, &prompts, "anything", None).await;
    let fallback = IntentDecision::fallback();
    assert_eq!(decision.requires_rag, fallback.requires_rag);
    assert_eq!(decision.requires_human, fallback.requires_human);
    assert_eq!(decision.complexity_score, fallback.complexity_score);
}

#[tokio::test]
async fn explicit_handoff_skips_retrieval() {
    let fx = fixture();
    fx.mock.set_intent(
        "{\"requires_rag\": false, \"requires_human\": true, \"complexity_score\": 1, \
         \"pricing_intent\": false, \"reason\": \"user asked for a human\"}",
    );

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "let me talk to a person"))
        .await
        .unwrap();

    assert!(response.requires_human);
    assert!(response.context_used.is_empty());
    assert!(response.answer.contains("human agent"));
}

#[tokio::test]
async fn handoff_tag_in_answer_escalates_and_skips_grading() {
    let fx = fixture();
    fx.engine
        .ingest_document(&fx.tenant_id, "prices.md", "Consulting hour: $100.")
        .await
        .unwrap();

    fx.mock
        .set_answer("Great! I will connect you with a specialist to finalize. [HANDOFF]");

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "ok, I want to buy it"))
        .await
        .unwrap();

    assert!(response.requires_human);
    assert!(!response.answer.contains("[HANDOFF]"));
    assert!(response.answer.contains("specialist"));
    assert_eq!(fx.mock.grade_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn small_talk_bypasses_retrieval() {
    let fx = fixture();
    fx.mock.set_intent(
        "{\"requires_rag\": false, \"requires_human\": false, \"complexity_score\": 1, \
         \"pricing_intent\": false, \"reason\": \"greeting\"}",
    );

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "hi there!"))
        .await
        .unwrap();

    assert_eq!(response.answer, "Hello! How can I help you today?");
    assert!(response.context_used.is_empty());
    assert_eq!(fx.mock.answer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn followup_is_contextualized_against_memory() {
    let fx = fixture();
    let session = fx.engine.memory().create_session(&fx.tenant_id).unwrap();
    let memory = fx.engine.memory();
    memory
        .append_turn(&session, TurnRole::User, "tell me about product X")
        .unwrap();
    memory
        .append_turn(&session, TurnRole::Ai, "X costs $10")
        .unwrap();

    fx.engine
        .ingest_document(&fx.tenant_id, "stock.md", "Product X: 14 units in stock.")
        .await
        .unwrap();

    fx.mock.set_contextualized("Is product X in stock?");

    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "is it in stock?").with_session(&session))
        .await
        .unwrap();

    // The synthesizer saw the standalone question, not the bare pronoun.
    assert!(response.answer.contains("User Question: Is product X in stock?"));
}

#[tokio::test]
async fn foreign_session_degrades_to_stateless() {
    let fx = fixture();
    let other_tenant = fx
        .engine
        .documents()
        .create_tenant("rival", None)
        .unwrap();
    let foreign_session = fx.engine.memory().create_session(&other_tenant).unwrap();

    let response = fx
        .engine
        .answer(
            AnswerRequest::new(&fx.tenant_id, "what is your refund policy?")
                .with_session(&foreign_session),
        )
        .await
        .unwrap();

    // Answer is still served, but the foreign transcript was never touched.
    assert!(!response.answer.is_empty());
    assert!(response.session_id.is_none());
    assert!(fx
        .engine
        .memory()
        .full_transcript(&foreign_session)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn pricing_intent_pulls_supplemental_context() {
    struct PricingFeed;

    #[async_trait::async_trait]
    impl SupplementalSource for PricingFeed {
        async fn fetch(&self, _identifier: &str, _query: Option<&str>) -> AppResult<String> {
            Ok("Widget: $10, in stock".to_string())
        }
    }

    let fx = fixture();
    let engine = fx.engine.with_supplemental(Arc::new(PricingFeed));

    let response = engine
        .answer(
            AnswerRequest::new(&fx.tenant_id, "how much is the widget?")
                .with_provider("ollama")
                .with_session("none"), // unknown session: stateless, still answers
        )
        .await
        .unwrap();
    // pricing_intent came from the caller, not the classifier
    let response_with_flag = {
        let mut request = AnswerRequest::new(&fx.tenant_id, "how much is the widget?");
        request.pricing_intent = Some(true);
        engine.answer(request).await.unwrap()
    };

    assert!(!response.context_used.contains("[LIVE DATA]"));
    assert!(response_with_flag.context_used.contains("[LIVE DATA]"));
    assert!(response_with_flag.context_used.contains("Widget: $10"));
}

#[tokio::test]
async fn rerank_parse_failure_demotes_instead_of_discarding() {
    let fx = fixture();
    let config = AppConfig::default();
    let registry = ProviderRegistry::new(&config);
    for step in KNOWN_STEPS {
        registry.register(step, "ollama", None, fx.mock.clone());
    }
    let prompts = colloquy_engine::prompts::PromptSet::new().unwrap();

    let candidates = vec![
        RetrievalCandidate {
            chunk_id: "1".to_string(),
            filename: "noise.md".to_string(),
            content: "unrelated content".to_string(),
            score: 0.9,
            rerank_score: None,
        },
        RetrievalCandidate {
            chunk_id: "2".to_string(),
            filename: "hit.md".to_string(),
            content: "MARK_RELEVANT content".to_string(),
            score: 0.1,
            rerank_score: None,
        },
    ];

    let reranked =
        rerank::rerank_candidates(&registry, &prompts, "query", candidates, 2, None).await;

    // The scored candidate moves up; the unparseable one is kept at 0.
    assert_eq!(reranked.len(), 2);
    assert_eq!(reranked[0].filename, "hit.md");
    assert_eq!(reranked[0].rerank_score, Some(9));
    assert_eq!(reranked[1].rerank_score, Some(0));
}

#[tokio::test]
async fn complexity_routes_to_the_stronger_model() {
    let fx = fixture();
    fx.mock.set_intent(
        "{\"requires_rag\": true, \"requires_human\": false, \"complexity_score\": 8, \
         \"pricing_intent\": false, \"reason\": \"multi-step comparison\"}",
    );

    // The complex_reasoning step is registered with the same mock, so the
    // call succeeds; what matters is that the pipeline does not error when
    // routing away from the default generation step.
    let response = fx
        .engine
        .answer(AnswerRequest::new(&fx.tenant_id, "compare plan A and plan B in detail"))
        .await
        .unwrap();

    assert!(!response.answer.is_empty());
}
