use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use voxhire::agent::{Orchestrator, SessionOutcome};
use voxhire::livekit::{AccessManager, Role, TokenRequest};
use voxhire::media;
use voxhire::session::NewSession;
use voxhire::{AppError, ServerConfig};

/// Voxhire - unattended real-time voice interview agent
#[derive(Parser, Debug)]
#[command(name = "voxhire")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the interview agent for one session. Candidate audio is read
    /// from stdin and agent audio written to stdout; logs go to stderr.
    Run {
        /// Session id to run
        #[arg(long, conflicts_with = "room")]
        session_id: Option<String>,

        /// Locate the session by its room name instead
        #[arg(long)]
        room: Option<String>,

        /// Finalize even with fewer than the required candidate responses
        #[arg(long)]
        override_incomplete: bool,
    },

    /// Create a session record with its room and join tokens
    CreateSession {
        #[arg(long)]
        name: String,

        #[arg(long)]
        position: String,

        #[arg(long)]
        email: String,

        /// Plain-text job description file
        #[arg(long)]
        jd_file: Option<PathBuf>,

        /// Plain-text resume file
        #[arg(long)]
        resume_file: Option<PathBuf>,
    },

    /// List all session records
    Sessions,

    /// Delete a session record and its room
    Cleanup {
        #[arg(long)]
        session_id: String,
    },

    /// Issue a signed join token for a room
    Token {
        #[arg(long)]
        room: String,

        #[arg(long)]
        identity: String,

        /// candidate or agent
        #[arg(long, default_value = "candidate")]
        role: String,

        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },

    /// Show room details and current participants
    Room {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (must happen before config loading)
    let _ = dotenvy::dotenv();

    // stdout carries agent audio in `run`; keep logs on stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env()?,
    };

    match cli.command {
        Commands::Run {
            session_id,
            room,
            override_incomplete,
        } => {
            let orchestrator = Orchestrator::from_config(config)?;

            let session_id = match (session_id, room) {
                (Some(id), _) => id,
                (None, Some(room_name)) => orchestrator
                    .store()
                    .find_by_room(&room_name)
                    .await?
                    .map(|s| s.session_id)
                    .ok_or_else(|| anyhow!("no session bound to room {room_name}"))?,
                (None, None) => return Err(anyhow!("one of --session-id or --room is required")),
            };

            let (link, endpoints) = media::channel(media::CHANNEL_BUFFER);
            let (reader, writer) = media::spawn_stdio_bridge(endpoints);

            let outcome = orchestrator
                .run_session(&session_id, link, override_incomplete)
                .await?;
            match outcome {
                SessionOutcome::Completed { summary_degraded } => {
                    info!(session_id = %session_id, summary_degraded, "interview session completed");
                }
                SessionOutcome::Incomplete { candidate_entries } => {
                    info!(
                        session_id = %session_id,
                        candidate_entries,
                        "interview left incomplete; rerun with --override-incomplete to force finalization"
                    );
                }
            }

            reader.abort();
            let _ = writer.await;
        }

        Commands::CreateSession {
            name,
            position,
            email,
            jd_file,
            resume_file,
        } => {
            let jd_full = read_optional(jd_file)?;
            let resume_full = read_optional(resume_file)?;
            let orchestrator = Orchestrator::from_config(config)?;
            let session = orchestrator
                .create_complete_session(NewSession {
                    candidate_name: name,
                    position,
                    email,
                    jd_full,
                    resume_full,
                })
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "session_id": session.session_id,
                    "room_name": session.room_name,
                    "candidate_token": session.candidate_token,
                    "agent_token": session.agent_token,
                }))?
            );
        }

        Commands::Sessions => {
            let orchestrator = Orchestrator::from_config(config)?;
            for session in orchestrator.store().list().await? {
                println!(
                    "{}  {:12}  {}  ({} transcript entries)",
                    session.session_id,
                    session.status.to_string(),
                    session.candidate_name,
                    session.transcript.len()
                );
            }
        }

        Commands::Cleanup { session_id } => {
            let orchestrator = Orchestrator::from_config(config)?;
            orchestrator.cleanup_session(&session_id).await?;
            println!("cleaned up session {session_id}");
        }

        Commands::Token {
            room,
            identity,
            role,
            ttl_secs,
        } => {
            let access = AccessManager::new(&config)?;
            let role: Role = role.parse().map_err(|e: AppError| anyhow!(e))?;
            let token = access.issue_token(TokenRequest {
                room_name: &room,
                identity: &identity,
                role,
                ttl: std::time::Duration::from_secs(ttl_secs),
                metadata: None,
            })?;
            println!("{token}");
        }

        Commands::Room { name } => {
            let access = AccessManager::new(&config)?;
            match access.room_info(&name).await {
                Some(details) => {
                    println!("{}", serde_json::to_string_pretty(&details)?);
                    let participants = access.list_participants(&name).await;
                    println!("{}", serde_json::to_string_pretty(&participants)?);
                }
                None => println!("room {name} not found"),
            }
        }
    }

    Ok(())
}

fn read_optional(path: Option<PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display())),
        None => Ok(String::new()),
    }
}
