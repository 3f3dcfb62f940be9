//! Manage tenants.

use clap::{Args, Subcommand};
use colloquy_core::config::AppConfig;
use colloquy_core::AppResult;

/// Tenant management: create, wipe documents.
#[derive(Args, Debug)]
pub struct TenantCommand {
    #[command(subcommand)]
    action: TenantAction,
}

#[derive(Subcommand, Debug)]
enum TenantAction {
    /// Create a tenant and print its id
    New {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Preferred-language hint (e.g. "pt-BR, en")
        #[arg(short, long)]
        languages: Option<String>,
    },

    /// Delete every document chunk belonging to a tenant
    Wipe {
        /// Tenant id
        tenant: String,
    },
}

impl TenantCommand {
    pub async fn execute(self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let documents = engine.documents();

        match self.action {
            TenantAction::New { name, languages } => {
                let tenant_id = documents.create_tenant(&name, languages.as_deref())?;
                println!("{}", tenant_id);
            }
            TenantAction::Wipe { tenant } => {
                let deleted = documents.scope(&tenant).delete_all()?;
                println!("Deleted {} chunks for tenant {}", deleted, tenant);
            }
        }

        Ok(())
    }
}
