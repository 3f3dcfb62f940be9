//! Prompt templates for every model-facing pipeline stage.
//!
//! Templates are Handlebars strings registered once per engine instance and
//! rendered with plain JSON variables. HTML escaping is disabled; these are
//! plain-text prompts, not markup.

use colloquy_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::Value;

/// Rewrites a follow-up question into a standalone one.
const CONTEXTUALIZE: &str = "\
Given the chat history and the latest user question, formulate a standalone question \
that can be understood without the chat history.
Tasks:
1. Resolve pronouns (it, this, that, the product) to specific items mentioned in history.
2. If the user asks about price or stock (e.g., 'is it available?'), explicitly include the product name in the new question.
3. Return the standalone question as is. Do NOT answer it.
4. Keep the language of the standalone question the same as the user's latest question.

<chat_history>
{{history_str}}
</chat_history>

Latest Question: {{query}}

Standalone Question:";

/// Routes the conversation: retrieval, small talk, or human handoff.
const INTENT: &str = "\
You are a router. Analyze the user's query and decide how to route the conversation.

Rules for RAG (requires_rag):
1. Greetings, thanks, or the user sharing their own personal data -> false
2. Questions about entities, products, policies, prices, facts -> true
3. Ambiguous questions -> true
4. Unsure -> true

Rules for HUMAN (requires_human):
1. User explicitly asks for 'a human', 'real person', 'support agent', 'manager' -> true
2. Otherwise -> false

Complexity (complexity_score, 1-10):
1-3: simple greeting, thanks, or single-fact question.
4-6: requires understanding context or summarizing a few points.
7-10: multi-step reasoning, comparison, or ambiguous/creative requests.

Pricing intent (pricing_intent):
true if the user asks about costs, prices, investment, specific products, or availability.

Return strictly this JSON object and nothing else:
{\"requires_rag\": boolean, \"requires_human\": boolean, \"complexity_score\": integer, \"pricing_intent\": boolean, \"reason\": \"short string\"}

Query: {{query}}

JSON Output:";

/// Generates a hypothetical answer for embedding (HyDE).
const HYDE: &str = "\
Please write a short, professional passage that answers the following question. \
Adopt the style of a business FAQ or service description. \
Do not include intro/outro. It does not have to be factually true, just semantically \
relevant to the question.

Question: {{query}}

Passage:";

/// Scores one candidate's relevance to the query.
const RERANK: &str = "\
You are a relevance ranking system. Analyze if the document provides value for answering the query.
Query: {{query}}
Document: {{content}}

Task:
1. Assign a relevance score from 0 (irrelevant) to 10 (highly relevant).
2. Return ONLY a JSON object. No markdown.

JSON Structure: { \"score\": integer }";

/// The main answer prompt: hierarchy of truth, language rules, handoff tag.
const ANSWER: &str = "\
You are the AI support assistant for the company described in the context. \
Use 'we' and 'us' to refer to that company.

<instructions>
1. HIERARCHY OF TRUTH:
   - PRIORITY 1: the [LIVE DATA] section (prices, stock, availability). Treat it as absolute truth.
   - PRIORITY 2: the retrieved context (general information, policies).
   - PRIORITY 3: the chat history (user details, conversation flow).
2. LANGUAGE: always answer in the same language as the user's question. {{lang_instruction}}
3. If neither the context, the live data, nor the history answers the question, say you don't know (in the user's language). Do not invent facts.
4. HANDOFF: if the user agrees to a purchase or asks to complete a transaction, write a polite confirmation followed immediately by the tag [HANDOFF].
5. Do not mention retrieval, context sections, or document numbers; answer as if you knew the material directly.
</instructions>

<chat_history>
{{history_str}}
</chat_history>

<retrieved_context>
{{context_str}}
</retrieved_context>

User Question: {{query}}

Answer:";

/// Small-talk prompt: no retrieval plumbing.
const SMALL_TALK: &str = "\
You are a helpful AI support assistant.
The user has sent a message that does not require looking anything up (a greeting, \
thanks, or small talk). Respond politely and concisely.

<instructions>
1. If asked who you are, say you are an AI assistant that can answer most questions or bring in a human agent.
2. Use the chat history to maintain conversation context (e.g. remember names).
3. Do NOT invent information about documents you have not seen.
4. Always answer in the same language as the user's message. {{lang_instruction}}
</instructions>

<chat_history>
{{history_str}}
</chat_history>

Message: {{query}}

Response:";

/// Confirmation message when the user asked for a human.
const HANDOFF: &str = "\
You are a helpful support assistant.
The user explicitly asked to speak to a human agent.
Generate a short, polite response confirming you will transfer them to a human agent.
Answer in the same language as the user's message. {{lang_instruction}}

User Message: {{query}}

Response:";

/// Grades a synthesized answer against its question and context.
const GRADER: &str = "\
You are a quality control auditor.
Context: {{context}}
Question: {{question}}
Answer: {{answer}}

Scoring criteria:
1. Hallucination check: is the answer supported by the context?
2. Relevance check: does it directly address the question?
3. If the answer is a polite refusal for safety/policy reasons, score 1 (pass).

Return ONLY this JSON object:
{\"score\": 0 or 1, \"reason\": \"explanation\"}";

/// Produces a better search query after a failed grade.
const REWRITE: &str = "\
You are a helpful assistant that optimizes search queries.
The user asked a question, but the previous search yielded bad results.
Look at the original question and the reason for failure.
Write a BETTER, more specific search query to find the answer.
Output ONLY the new query string.

Original question: {{question}}
Failure reason: {{reason}}

New query:";

/// Registered prompt templates, built once per engine.
pub struct PromptSet {
    registry: Handlebars<'static>,
}

impl PromptSet {
    /// Register all pipeline templates.
    pub fn new() -> AppResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        let templates = [
            ("contextualize", CONTEXTUALIZE),
            ("intent", INTENT),
            ("hyde", HYDE),
            ("rerank", RERANK),
            ("answer", ANSWER),
            ("small_talk", SMALL_TALK),
            ("handoff", HANDOFF),
            ("grader", GRADER),
            ("rewrite", REWRITE),
        ];

        for (name, template) in templates {
            registry
                .register_template_string(name, template)
                .map_err(|e| {
                    AppError::Engine(format!("Failed to register template '{}': {}", name, e))
                })?;
        }

        Ok(Self { registry })
    }

    /// Render a template with JSON variables.
    pub fn render(&self, name: &str, variables: &Value) -> AppResult<String> {
        self.registry
            .render(name, variables)
            .map_err(|e| AppError::Engine(format!("Failed to render template '{}': {}", name, e)))
    }
}
