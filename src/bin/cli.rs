use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use coedit::{
    ChangeNotification, DocumentStore, EditSession, MemoryStore, RevisionMarker, SessionSnapshot,
};
use colored::*;
use once_cell::sync::Lazy;
use serde_json::json;

// Process-wide store, lazily initialized on first use
static STORE: Lazy<Arc<MemoryStore>> = Lazy::new(|| Arc::new(MemoryStore::new()));

#[derive(Parser)]
#[command(name = "coedit")]
#[command(
    about = "Collaborative edit conflict detector - revision-aware change filtering with a manual refresh protocol",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay two editors racing on one document against an in-memory store
    Simulate {
        /// Document id to edit
        #[arg(long, default_value = "categories/1")]
        id: String,

        /// Bump the store epoch mid-run (models a server restart)
        #[arg(long)]
        bump_epoch: bool,
    },

    /// Evaluate the relevance filter for one notification
    Check {
        /// Baseline marker captured at load, e.g. 1-10
        baseline: RevisionMarker,

        /// Local saves performed since load
        local_saves: u64,

        /// Marker carried by the inbound notification, e.g. 1-13
        notification: RevisionMarker,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { id, bump_epoch } => simulate(&id, bump_epoch).await,
        Commands::Check {
            baseline,
            local_saves,
            notification,
        } => {
            let snapshot = SessionSnapshot {
                baseline,
                local_saves,
            };
            let n = ChangeNotification::put("cli", notification);
            if coedit::is_foreign_change(&n, &snapshot) {
                println!("{}", "foreign change - offer refresh".yellow().bold());
            } else {
                println!("{}", "own change - ignore".green());
            }
            Ok(())
        }
    }
}

async fn simulate(id: &str, bump_epoch: bool) -> Result<()> {
    let store = STORE.clone();

    println!("{}", "Seeding document...".bright_cyan());
    store
        .save(id, json!({"name": "Beverages", "description": "Soft drinks"}), None)
        .await?;

    let alice = Arc::new(
        EditSession::open(store.as_ref(), id)
            .await?
            .ok_or_else(|| anyhow!("seed document missing"))?,
    );
    let mut prompts = alice.clone().watch_foreign(&store.changes());

    println!(
        "{} Alice loaded {} at {}",
        "→".bright_blue(),
        id.bright_white(),
        alice.snapshot().baseline.to_string().bright_yellow()
    );

    // Alice edits and saves; her own notification must not prompt her
    alice.edit(|body| body["description"] = json!("Soft drinks, coffees, teas"));
    let own = alice.save(store.as_ref()).await?;
    println!(
        "{} Alice saved at {}",
        "→".bright_blue(),
        own.to_string().bright_yellow()
    );

    if bump_epoch {
        store.bump_epoch();
    }

    // Bob edits the same document behind Alice's back
    let bob = EditSession::open(store.as_ref(), id)
        .await?
        .ok_or_else(|| anyhow!("seed document missing"))?;
    bob.edit(|body| body["name"] = json!("Drinks"));
    let foreign = bob.save(store.as_ref()).await?;
    println!(
        "{} Bob saved at {}",
        "→".bright_blue(),
        foreign.to_string().bright_yellow()
    );

    let (change, _verdict) = prompts
        .recv()
        .await
        .ok_or_else(|| anyhow!("notification stream ended"))?;
    println!(
        "{} Document changed on the server at {}. Refreshing...",
        "!".bright_red().bold(),
        change.marker.to_string().bright_yellow()
    );

    alice.refresh(store.as_ref()).await?;
    let doc = alice.document();
    println!(
        "{} Alice now sees name={} description={}",
        "✓".green().bold(),
        doc.field("name").unwrap_or("?").bright_white(),
        doc.field("description").unwrap_or("?").bright_white()
    );

    prompts.unsubscribe();
    Ok(())
}
