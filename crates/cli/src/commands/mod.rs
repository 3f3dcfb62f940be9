//! CLI command implementations.

mod ask;
mod ingest;
mod session;
mod tenant;

pub use ask::AskCommand;
pub use ingest::IngestCommand;
pub use session::SessionCommand;
pub use tenant::TenantCommand;

use colloquy_core::config::{AppConfig, KNOWN_STEPS};
use colloquy_core::AppResult;
use colloquy_engine::{DocumentStore, Engine};
use colloquy_llm::ProviderRegistry;
use colloquy_memory::MemoryStore;
use std::sync::Arc;

/// Wire an engine instance from configuration.
///
/// Both stores share the configured database file; the registry is built
/// once per process and constructs provider clients lazily.
pub(crate) fn build_engine(config: &AppConfig) -> AppResult<Engine> {
    let registry = Arc::new(ProviderRegistry::new(config));
    let documents = DocumentStore::open(&config.database)?;
    let memory = MemoryStore::open(&config.database)?;

    Engine::new(config.clone(), registry, documents, memory)
}

/// Log the configured step routes at debug level (diagnostics).
pub(crate) fn log_step_routes(config: &AppConfig) {
    for step in KNOWN_STEPS {
        let (provider, model) = config.route_for_step(step);
        tracing::debug!(
            "Step route: {} -> {} ({})",
            step,
            provider,
            model.as_deref().unwrap_or("provider default")
        );
    }
}
