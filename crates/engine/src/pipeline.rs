//! The correction-loop controller.
//!
//! Orchestrates contextualize -> classify -> (small talk | handoff |
//! retrieve -> synthesize -> grade), rewriting the search query and
//! re-entering retrieval when a grade fails, bounded by the configured
//! retry budget. Every stage degrades instead of failing: the RAG flow has
//! no code path that returns a hard error to the end user.

use crate::prompts::PromptSet;
use crate::storage::DocumentStore;
use crate::types::{AnswerRequest, AnswerResponse, SupplementalSource};
use crate::{contextualize, grader, ingest, intent, retriever, rewrite, synthesizer};
use colloquy_core::config::AppConfig;
use colloquy_core::AppResult;
use colloquy_llm::ProviderRegistry;
use colloquy_memory::types::render_transcript;
use colloquy_memory::{ChatTurn, MemoryStore, TurnRole};
use std::sync::Arc;

/// The answering engine: one instance serves all tenants, one independent
/// async task per inbound question.
pub struct Engine {
    config: AppConfig,
    registry: Arc<ProviderRegistry>,
    documents: DocumentStore,
    memory: MemoryStore,
    prompts: PromptSet,
    supplemental: Option<Arc<dyn SupplementalSource>>,
}

impl Engine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        config: AppConfig,
        registry: Arc<ProviderRegistry>,
        documents: DocumentStore,
        memory: MemoryStore,
    ) -> AppResult<Self> {
        Ok(Self {
            config,
            registry,
            documents,
            memory,
            prompts: PromptSet::new()?,
            supplemental: None,
        })
    }

    /// Attach a supplemental context source (e.g. a live pricing feed).
    pub fn with_supplemental(mut self, source: Arc<dyn SupplementalSource>) -> Self {
        self.supplemental = Some(source);
        self
    }

    /// The document store (tenant admin, ingestion maintenance).
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// The conversation memory store (session management).
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Ingest a document for a tenant using the configured chunking.
    pub async fn ingest_document(
        &self,
        tenant_id: &str,
        filename: &str,
        content: &str,
    ) -> AppResult<u32> {
        let scope = self.documents.scope(tenant_id);
        ingest::ingest_document(
            &self.registry,
            &scope,
            filename,
            content,
            self.config.engine.chunk_size,
            self.config.engine.chunk_overlap,
        )
        .await
    }

    /// Delete all chunks ingested under a filename for a tenant.
    pub fn delete_document(&self, tenant_id: &str, filename: &str) -> AppResult<usize> {
        self.documents.scope(tenant_id).delete_by_filename(filename)
    }

    /// Answer a question for a tenant.
    ///
    /// This is the external entry point specified in the engine's contract:
    /// it always resolves to a user-facing answer or an explicit handoff
    /// signal, never a hard error for the RAG flow itself.
    pub async fn answer(&self, request: AnswerRequest) -> AppResult<AnswerResponse> {
        tracing::info!(
            "Answering for tenant {} (session: {:?})",
            request.tenant_id,
            request.session_id
        );

        let use_hyde = request.use_hyde.unwrap_or(self.config.engine.use_hyde);
        let use_rerank = request.use_rerank.unwrap_or(self.config.engine.use_rerank);
        let provider = request.provider.as_deref();

        let lang_hint = match self.documents.tenant_languages(&request.tenant_id) {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!("Failed to load tenant language hint: {}", e);
                None
            }
        };
        let lang_instruction = synthesizer::language_instruction(lang_hint.as_deref());

        let session_id = self.resolve_session(&request);
        let history = self.load_history(session_id.as_deref());
        let history_str = render_transcript(&history);

        let standalone = contextualize::contextualize_query(
            &self.registry,
            &self.prompts,
            &request.query,
            &history,
            provider,
        )
        .await;

        let mut decision =
            intent::classify_intent(&self.registry, &self.prompts, &standalone, provider).await;

        // Pre-computed signals from the caller win over our own pass.
        if let Some(score) = request.complexity_score {
            decision.complexity_score = score;
        }
        if let Some(pricing) = request.pricing_intent {
            decision.pricing_intent = pricing;
        }

        if decision.requires_human {
            let message = synthesizer::handoff_message(
                &self.registry,
                &self.prompts,
                &standalone,
                &lang_instruction,
                provider,
            )
            .await;

            self.persist_exchange(session_id.as_deref(), &request.query, &message);
            return Ok(AnswerResponse {
                answer: message,
                requires_human: true,
                session_id,
                context_used: String::new(),
            });
        }

        if !decision.requires_rag {
            let answer = synthesizer::synthesize_small_talk(
                &self.registry,
                &self.prompts,
                &standalone,
                &history_str,
                &lang_instruction,
                provider,
            )
            .await;

            self.persist_exchange(session_id.as_deref(), &request.query, &answer);
            return Ok(AnswerResponse {
                answer,
                requires_human: false,
                session_id,
                context_used: String::new(),
            });
        }

        let external = self.resolve_external_context(&request, &decision, &standalone).await;
        let (answer, requires_human, context_used) = self
            .rag_loop(
                &request,
                &standalone,
                &history_str,
                &lang_instruction,
                decision.generation_step(),
                external.as_deref(),
                use_hyde,
                use_rerank,
            )
            .await;

        self.persist_exchange(session_id.as_deref(), &request.query, &answer);

        Ok(AnswerResponse {
            answer,
            requires_human,
            session_id,
            context_used,
        })
    }

    /// Retrieve -> synthesize -> grade, with bounded rewrite-and-retry.
    ///
    /// Returns `(answer, requires_human, context_used)`. Each retry replaces
    /// the search query; the user-facing question stays the standalone one.
    #[allow(clippy::too_many_arguments)]
    async fn rag_loop(
        &self,
        request: &AnswerRequest,
        standalone: &str,
        history_str: &str,
        lang_instruction: &str,
        generation_step: &str,
        external: Option<&str>,
        use_hyde: bool,
        use_rerank: bool,
    ) -> (String, bool, String) {
        let scope = self.documents.scope(&request.tenant_id);
        let provider = request.provider.as_deref();
        let limit = self.config.engine.retrieval_limit;
        let max_retries = self.config.engine.max_retries;

        let mut search_query = standalone.to_string();
        let mut retries = 0u32;

        loop {
            let candidates = retriever::retrieve(
                &self.registry,
                &scope,
                &self.prompts,
                &search_query,
                limit,
                use_hyde,
                use_rerank,
                provider,
            )
            .await;

            let context = synthesizer::build_context(&candidates, external);

            let raw = synthesizer::synthesize_answer(
                &self.registry,
                &self.prompts,
                generation_step,
                standalone,
                &context,
                history_str,
                lang_instruction,
                provider,
            )
            .await;

            let (answer, tagged_handoff) = synthesizer::detect_handoff(&raw);
            if tagged_handoff {
                tracing::info!("Handoff tag detected in synthesized answer");
                return (answer, true, context);
            }

            let grade = grader::grade_answer(
                &self.registry,
                &self.prompts,
                standalone,
                &context,
                &answer,
                provider,
            )
            .await;

            if grade.passed() {
                return (answer, false, context);
            }

            if retries >= max_retries {
                tracing::warn!(
                    "Grade failed after {} retries; returning last answer",
                    retries
                );
                return (answer, false, context);
            }

            match rewrite::rewrite_query(
                &self.registry,
                &self.prompts,
                &search_query,
                &grade.reason,
                provider,
            )
            .await
            {
                Ok(rewritten) => {
                    search_query = rewritten;
                    retries += 1;
                }
                Err(e) => {
                    tracing::warn!("Rewrite failed ({}); returning last answer", e);
                    return (answer, false, context);
                }
            }
        }
    }

    /// Validate the request's session against its tenant.
    ///
    /// A session belonging to another tenant (or unknown entirely) degrades
    /// to a stateless call; the answer is still served, but the foreign
    /// transcript is never read or written.
    fn resolve_session(&self, request: &AnswerRequest) -> Option<String> {
        let session_id = request.session_id.as_deref()?;

        match self.memory.session_tenant(session_id) {
            Ok(Some(owner)) if owner == request.tenant_id => Some(session_id.to_string()),
            Ok(Some(_)) => {
                tracing::warn!(
                    "Session {} does not belong to tenant {}; proceeding statelessly",
                    session_id,
                    request.tenant_id
                );
                None
            }
            Ok(None) => {
                tracing::warn!("Unknown session {}; proceeding statelessly", session_id);
                None
            }
            Err(e) => {
                tracing::warn!("Session lookup failed ({}); proceeding statelessly", e);
                None
            }
        }
    }

    /// Load the contextualization window; read failures degrade to an
    /// empty history (the turn behaves like a first turn).
    fn load_history(&self, session_id: Option<&str>) -> Vec<ChatTurn> {
        let Some(session_id) = session_id else {
            return Vec::new();
        };

        match self
            .memory
            .recent_turns(session_id, self.config.engine.history_window)
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!("Failed to load history ({}); treating as first turn", e);
                Vec::new()
            }
        }
    }

    /// Resolve supplemental live data: the caller's pre-fetched context
    /// wins; otherwise a configured source is consulted on pricing intent.
    /// Fetch failures degrade to no supplemental data.
    async fn resolve_external_context(
        &self,
        request: &AnswerRequest,
        decision: &crate::types::IntentDecision,
        standalone: &str,
    ) -> Option<String> {
        if request.external_context.is_some() {
            return request.external_context.clone();
        }

        if !decision.pricing_intent {
            return None;
        }

        let source = self.supplemental.as_ref()?;
        match source.fetch(&request.tenant_id, Some(standalone)).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("Injecting supplemental context for pricing intent");
                Some(text)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Supplemental fetch failed: {}", e);
                None
            }
        }
    }

    /// Persist the delivered exchange: the original user question and the
    /// final answer. Intermediate rejected answers and rewritten queries are
    /// loop-internal and never reach the transcript. Write failures are
    /// logged and swallowed; the conversation continues without persisted
    /// history for this turn.
    fn persist_exchange(&self, session_id: Option<&str>, query: &str, answer: &str) {
        let Some(session_id) = session_id else {
            return;
        };

        if let Err(e) = self.memory.append_turn(session_id, TurnRole::User, query) {
            tracing::warn!("Failed to persist user turn: {}", e);
            return;
        }
        if let Err(e) = self.memory.append_turn(session_id, TurnRole::Ai, answer) {
            tracing::warn!("Failed to persist ai turn: {}", e);
        }
    }
}
