//! Adaptive retrieval-and-generation engine with a self-correcting loop.
//!
//! Answers natural-language questions for a tenant by combining retrieved
//! knowledge-base passages with a language model. The pipeline:
//! contextualize the question against conversation memory, classify intent,
//! retrieve hybrid (semantic + lexical) candidates fused with reciprocal
//! rank fusion, synthesize an answer, grade it, and rewrite-and-retry
//! retrieval when the grade fails; bounded, and always degrading to the
//! best available answer instead of failing the caller.

pub mod contextualize;
pub mod grader;
pub mod hyde;
pub mod ingest;
pub mod intent;
mod json;
pub mod pipeline;
pub mod prompts;
pub mod rerank;
pub mod retriever;
pub mod rewrite;
pub mod storage;
pub mod synthesizer;
pub mod types;

pub use pipeline::Engine;
pub use storage::DocumentStore;
pub use types::{
    AnswerRequest, AnswerResponse, Grade, IntentDecision, RetrievalCandidate, SupplementalSource,
};
