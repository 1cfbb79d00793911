pub mod country;

use clap::{Parser, Subcommand};

use crate::account::auth::hash_token;
use crate::config::IntakeConfig;
use crate::error::NodeError;
use crate::node::IntakeNode;

#[derive(Parser)]
#[command(name = "rust_intake")]
#[command(about = "Account intake node: takeover, session audit and acceptance", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the TOML config (created with defaults when missing)
    #[arg(long, global = true, default_value = "intake.toml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the RPC server and the background sweeper
    Serve,
    /// Run a single "process ready accounts" pass and exit
    Sweep,
    /// Country policy management (node must be stopped)
    Country {
        #[command(subcommand)]
        cmd: country::CountryCommands,
    },
    /// Print the operator passphrase installed on an accepted account (node must be stopped)
    OperatorPassphrase {
        account_id: String,
    },
    /// Print the argon2 hash for an admin token, for `security.admin_token_hash`
    HashToken {
        token: String,
    },
}

pub async fn run(command: Commands, config: IntakeConfig) -> Result<(), NodeError> {
    match command {
        Commands::Serve => {
            let node = IntakeNode::new(config)?;
            node.start().await
        }
        Commands::Sweep => {
            let node = IntakeNode::new(config)?;
            let summary = node.service.process_ready_accounts().await?;
            println!("Sweep complete:");
            println!("  Examined: {}", summary.examined);
            println!("  Claimed:  {}", summary.claimed);
            println!("  Accepted: {}", summary.accepted);
            println!("  Rejected: {}", summary.rejected);
            println!("  Failed:   {}", summary.failed);
            node.storage.flush().await?;
            Ok(())
        }
        Commands::Country { cmd } => {
            let node = IntakeNode::new(config)?;
            country::handle_country_command(&node, cmd)?;
            node.storage.flush().await?;
            Ok(())
        }
        Commands::OperatorPassphrase { account_id } => {
            let node = IntakeNode::new(config)?;
            let passphrase = node.service.operator_passphrase(&account_id)?;
            println!("{}", passphrase);
            Ok(())
        }
        Commands::HashToken { token } => {
            println!("{}", hash_token(&token)?);
            Ok(())
        }
    }
}
