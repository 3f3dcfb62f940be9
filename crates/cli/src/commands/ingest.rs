//! Ingest documents into a tenant's knowledge base.

use clap::Args;
use colloquy_core::config::AppConfig;
use colloquy_core::{AppError, AppResult};
use std::path::PathBuf;

/// Ingest a text file, or delete previously ingested chunks.
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Tenant id
    #[arg(short, long)]
    tenant: String,

    /// File to ingest (plain text / markdown)
    file: Option<PathBuf>,

    /// Delete all chunks previously ingested under this filename instead
    #[arg(long, conflicts_with = "file")]
    delete: Option<String>,
}

impl IngestCommand {
    pub async fn execute(self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;

        if let Some(filename) = &self.delete {
            let deleted = engine.delete_document(&self.tenant, filename)?;
            println!("Deleted {} chunks for '{}'", deleted, filename);
            return Ok(());
        }

        let path = self
            .file
            .ok_or_else(|| AppError::Config("Provide a file to ingest or --delete".to_string()))?;

        let content = std::fs::read_to_string(&path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::Config(format!("Invalid file path: {:?}", path)))?;

        let chunks = engine
            .ingest_document(&self.tenant, &filename, &content)
            .await?;

        println!("Ingested '{}' as {} chunks", filename, chunks);
        Ok(())
    }
}
