use clap::Subcommand;

use crate::account::CountryPolicy;
use crate::error::NodeError;
use crate::node::IntakeNode;

#[derive(Subcommand)]
pub enum CountryCommands {
    /// Create or update a country policy (used capacity is preserved)
    Set {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        max_capacity: u32,
        #[arg(long)]
        reward_amount: u64,
        #[arg(long)]
        wait_minutes: u64,
        #[arg(long, default_value = "true")]
        active: bool,
    },
    List,
}

pub fn handle_country_command(node: &IntakeNode, cmd: CountryCommands) -> Result<(), NodeError> {
    match cmd {
        CountryCommands::Set {
            code,
            name,
            max_capacity,
            reward_amount,
            wait_minutes,
            active,
        } => {
            let saved = node.service.upsert_country(&CountryPolicy {
                code,
                name,
                max_capacity,
                used_capacity: 0,
                reward_amount,
                wait_minutes,
                active,
            })?;
            println!("✅ Country +{} saved:", saved.code);
            print_policy(&saved);
        }
        CountryCommands::List => {
            let countries = node.service.list_countries()?;
            println!("Countries ({}):", countries.len());
            for c in &countries {
                print_policy(c);
            }
        }
    }
    Ok(())
}

fn print_policy(c: &CountryPolicy) {
    println!(
        " - +{} {} [{}] capacity {}/{}, reward {}, wait {}m",
        c.code,
        c.name,
        if c.active { "active" } else { "inactive" },
        c.used_capacity,
        c.max_capacity,
        c.reward_amount,
        c.wait_minutes
    );
}
