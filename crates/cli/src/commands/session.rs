//! Manage chat sessions.

use clap::{Args, Subcommand};
use colloquy_core::config::AppConfig;
use colloquy_core::AppResult;

/// Session management: create, inspect, delete.
#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    action: SessionAction,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Create a session for a tenant and print its id
    New {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,
    },

    /// Print a session's full transcript
    History {
        /// Session id
        session: String,
    },

    /// Delete a session and its transcript
    Delete {
        /// Session id
        session: String,
    },
}

impl SessionCommand {
    pub async fn execute(self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let memory = engine.memory();

        match self.action {
            SessionAction::New { tenant } => {
                let session_id = memory.create_session(&tenant)?;
                println!("{}", session_id);
            }
            SessionAction::History { session } => {
                let transcript = memory.full_transcript(&session)?;
                for turn in transcript {
                    println!(
                        "[{}] {}: {}",
                        turn.created_at.to_rfc3339(),
                        turn.role.as_str(),
                        turn.content
                    );
                }
            }
            SessionAction::Delete { session } => {
                memory.delete_session(&session)?;
                println!("Deleted session {}", session);
            }
        }

        Ok(())
    }
}
