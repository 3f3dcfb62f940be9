//! Ask a question against a tenant's knowledge base.

use clap::Args;
use colloquy_core::config::AppConfig;
use colloquy_core::AppResult;
use colloquy_engine::AnswerRequest;

/// Ask a question for a tenant.
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Tenant id
    #[arg(short, long)]
    tenant: String,

    /// The question to answer
    query: String,

    /// Session id for conversation memory (omit for a stateless call)
    #[arg(short, long)]
    session: Option<String>,

    /// Expand the query with a hypothetical answer before embedding
    #[arg(long)]
    hyde: bool,

    /// Rerank retrieval candidates with the LLM
    #[arg(long)]
    rerank: bool,

    /// Print the retrieved context along with the answer
    #[arg(long)]
    show_context: bool,
}

impl AskCommand {
    pub async fn execute(self, config: &AppConfig) -> AppResult<()> {
        super::log_step_routes(config);
        let engine = super::build_engine(config)?;

        let mut request = AnswerRequest::new(&self.tenant, &self.query)
            .with_hyde(self.hyde)
            .with_rerank(self.rerank);
        if let Some(session) = &self.session {
            request = request.with_session(session);
        }

        let response = engine.answer(request).await?;

        println!("{}", response.answer);
        if response.requires_human {
            eprintln!("(escalation: this conversation should be handed to a human)");
        }
        if self.show_context && !response.context_used.is_empty() {
            eprintln!("--- context used ---");
            eprintln!("{}", response.context_used);
        }

        Ok(())
    }
}
