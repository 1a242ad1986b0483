use crate::api::ChatApi;
use crate::client::Supervisor;
use crate::config::{Config, load_config};
use crate::registry::{RoomRegistry, rooms_exist};
use crate::relay::Relay;
use crate::session::SessionManager;
use crate::translate::GoogleTranslator;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "interlinked")]
#[command(about = "Room-pair translation relay bot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay client until interrupted
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Link two rooms for translation
    Link {
        /// First room name
        room1: String,
        /// First room language (human-readable, e.g. "English")
        lang1: String,
        /// Second room name
        room2: String,
        /// Second room language
        lang2: String,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip the remote room-directory existence check
        #[arg(long)]
        skip_directory_check: bool,
    },
    /// List linked room pairs
    Links {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show session and registry state
    Status {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => cmd_run(config.as_deref()).await,
        Commands::Link {
            room1,
            lang1,
            room2,
            lang2,
            config,
            skip_directory_check,
        } => {
            cmd_link(
                config.as_deref(),
                &room1,
                &lang1,
                &room2,
                &lang2,
                skip_directory_check,
            )
            .await
        }
        Commands::Links { config } => cmd_links(config.as_deref()).await,
        Commands::Status { config } => cmd_status(config.as_deref()),
    }
}

async fn cmd_run(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (api, sessions, registry) = build_components(&config)?;
    let translator = Arc::new(GoogleTranslator::new(&config.translation)?);
    let relay = Relay::new(registry, translator, api.clone(), sessions.clone());
    let supervisor = Supervisor::new(&config, api, sessions, relay)?;

    info!("starting relay client for {}", config.chat_host);
    let handle = supervisor.spawn();

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "failed to listen for shutdown signal")?;
    info!("shutdown requested, stopping client");
    if !handle.stop().await {
        warn!("client thread did not stop gracefully");
    }
    info!("client stopped");
    Ok(())
}

async fn cmd_link(
    config_path: Option<&std::path::Path>,
    room1: &str,
    lang1: &str,
    room2: &str,
    lang2: &str,
    skip_directory_check: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let (api, sessions, registry) = build_components(&config)?;

    if !skip_directory_check {
        let session = sessions
            .get_session()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        println!("Checking the room directory for {room1} and {room2}...");
        if !rooms_exist(&api, &session, room1, room2).await? {
            bail!("one or both rooms do not exist — check the spelling");
        }
    }

    let pair = registry.add_pair(room1, lang1, room2, lang2)?;
    println!("Linked {room1} ({lang1}) <-> {room2} ({lang2}) as pair {}", pair.pair_id);
    println!("Restart the running client to subscribe to the new rooms.");
    Ok(())
}

async fn cmd_links(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (_, _, registry) = build_components(&config)?;
    let pairs = registry.pairs()?;
    if pairs.is_empty() {
        println!("No rooms have been linked yet.");
        return Ok(());
    }
    println!("{:<38} {:<24} {:<10} {:<24} {:<10}", "Pair ID", "Room 1", "Lang 1", "Room 2", "Lang 2");
    for pair in pairs {
        println!(
            "{:<38} {:<24} {:<10} {:<24} {:<10}",
            pair.pair_id, pair.room1_name, pair.room1_lang, pair.room2_name, pair.room2_lang
        );
    }
    Ok(())
}

fn cmd_status(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (_, _, registry) = build_components(&config)?;

    println!("Host:          {}", config.chat_host);
    match registry.pairs() {
        Ok(pairs) => println!("Linked pairs:  {}", pairs.len()),
        Err(e) => println!("Linked pairs:  unreadable ({e:#})"),
    }
    match registry.language_codes() {
        Ok(codes) => println!("Languages:     {}", codes.len()),
        Err(e) => println!("Languages:     unreadable ({e:#})"),
    }

    let cache_path = config.session_cache_file()?;
    let session = std::fs::read_to_string(&cache_path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
    match session {
        Some(cached) => {
            let expires_at = cached
                .get("expiresAt")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok());
            match expires_at {
                Some(t) if t > chrono::Utc::now() => println!("Session:       valid until {t}"),
                Some(t) => println!("Session:       expired at {t}"),
                None => println!("Session:       cache present but unreadable"),
            }
        }
        None => println!("Session:       none cached"),
    }
    Ok(())
}

fn build_components(config: &Config) -> Result<(Arc<ChatApi>, Arc<SessionManager>, RoomRegistry)> {
    let api = Arc::new(ChatApi::new(config)?);
    let sessions = Arc::new(SessionManager::new(api.clone(), config.session_cache_file()?));
    let registry = RoomRegistry::new(config.rooms_file()?, config.language_codes_file()?);
    Ok((api, sessions, registry))
}
