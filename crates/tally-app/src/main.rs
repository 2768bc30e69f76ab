//! Tally application binary - composition root.
//!
//! Ties the crates together into one executable:
//! 1. Load configuration from TOML
//! 2. Open storage (SQLite)
//! 3. Construct the provider client from explicit config
//! 4. Bootstrap a session and run a line-oriented chat loop on stdin
//!
//! The REPL stands in for the transport layer, which is an external
//! collaborator; everything below it is the same orchestration path a
//! socket or HTTP front end would drive.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tally_chat::{Orchestrator, SessionBootstrap};
use tally_core::config::TallyConfig;
use tally_provider::{ChatClient, ChatProvider};
use tally_storage::{ChatStore, Database, LookupTranslator};

/// Resolve the config file path (TALLY_CONFIG env, or ~/.tally/config.toml).
fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TALLY_CONFIG") {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tally").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Tally v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = config_path();
    let mut config = TallyConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // The API key comes from the environment when present, never from
    // ambient globals inside the provider.
    if config.provider.api_key.is_none() {
        if let Ok(key) = std::env::var("TALLY_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            if !key.is_empty() {
                config.provider.api_key = Some(key);
            }
        }
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("tally.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let store = Arc::new(ChatStore::new(Arc::clone(&db)));
    let translator = Arc::new(LookupTranslator::new(Arc::clone(&db)));

    // Provider client.
    let provider: Arc<dyn ChatProvider> = Arc::new(ChatClient::new(config.provider.clone())?);
    tracing::info!(model = %config.provider.model, "Provider client ready");

    let orchestrator = Orchestrator::new(provider, Arc::clone(&store), translator)
        .with_history_limit(config.chat.history_limit);

    // Session bootstrap: fresh session per run.
    let bootstrap = SessionBootstrap::new(store);
    let opened = bootstrap.open(None, None).await?;
    let session_id = opened.session_id.to_string();
    println!("Session {} ({})", session_id, opened.status.as_str());
    println!("Type a question, or 'exit' to quit.");

    // Chat loop.
    let stdin = std::io::stdin();
    loop {
        print!("tally> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }

        let outcome = orchestrator
            .process_turn(query, Some(&session_id), None)
            .await;
        match (outcome.reply_text(), outcome.error_text()) {
            (Some(reply), _) => println!("{}", reply),
            (_, Some(error)) => println!("error: {}", error),
            _ => {}
        }
    }

    Ok(())
}
