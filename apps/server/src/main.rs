use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_auth::{Identity, SessionVerifier};
use parley_config::load as load_config;
use parley_gateway::{create_router, GatewayState};
use parley_runtime::{telemetry, BackendServices};
use sqlx::Row;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Parley messaging backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the HTTP and websocket server (default)
    Serve,
    /// Mint a session token for local testing
    IssueToken {
        /// Identity to put in the token subject
        identity: String,
        /// Lifetime in seconds, defaults to the configured TTL
        #[arg(long)]
        ttl_seconds: Option<i64>,
    },
    /// Print requests, rooms and messages stored in the database
    DumpData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::IssueToken {
            identity,
            ttl_seconds,
        } => issue_token(identity, ttl_seconds),
        Commands::DumpData => dump_data().await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting Parley backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let verifier: Arc<dyn SessionVerifier> = Arc::new(services.authenticator.clone());
    let state = GatewayState::new(
        services.db_pool.clone(),
        verifier,
        &config.auth,
        &config.realtime,
    );
    let app = create_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(parley_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

fn issue_token(identity: String, ttl_seconds: Option<i64>) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let authenticator = parley_auth::Authenticator::new(&config.auth);
    let identity = Identity::new(identity.trim());

    let token = match ttl_seconds {
        Some(seconds) => authenticator
            .issue_token_with_ttl(&identity, chrono::Duration::seconds(seconds.clamp(0, i64::MAX / 1_000))),
        None => authenticator.issue_token(&identity),
    }
    .context("failed to issue token")?;

    println!("{token}");
    Ok(())
}

async fn dump_data() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let requests = sqlx::query(
        r#"
        SELECT public_id, sender_id, receiver_id, status, created_at, resolved_at
        FROM chat_requests
        ORDER BY id ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch chat requests")?;

    println!("=== CHAT REQUESTS ===");
    if requests.is_empty() {
        println!("No chat requests found in database");
    } else {
        println!("Found {} chat requests:", requests.len());
        println!(
            "{:<26} {:<20} {:<20} {:<10} {:<34} {:<34}",
            "Public ID", "Sender", "Receiver", "Status", "Created At", "Resolved At"
        );
        println!("{}", "-".repeat(150));

        for request in requests {
            let public_id: String = request.get("public_id");
            let sender_id: String = request.get("sender_id");
            let receiver_id: String = request.get("receiver_id");
            let status: String = request.get("status");
            let created_at: String = request.get("created_at");
            let resolved_at: Option<String> = request.get("resolved_at");

            println!(
                "{:<26} {:<20} {:<20} {:<10} {:<34} {:<34}",
                public_id,
                sender_id,
                receiver_id,
                status,
                created_at,
                resolved_at.as_deref().unwrap_or("NULL")
            );
        }
    }

    println!("\n=== ROOMS ===");
    let rooms = sqlx::query(
        r#"
        SELECT r.public_id, q.public_id AS request_public_id, r.created_at,
               GROUP_CONCAT(p.identity, ', ') AS participants
        FROM chat_rooms r
        JOIN chat_requests q ON q.id = r.request_id
        JOIN room_participants p ON p.room_id = r.id
        GROUP BY r.id
        ORDER BY r.id ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch rooms")?;

    if rooms.is_empty() {
        println!("No rooms found in database");
    } else {
        println!("Found {} rooms:", rooms.len());
        println!(
            "{:<26} {:<26} {:<40} {:<34}",
            "Public ID", "Request", "Participants", "Created At"
        );
        println!("{}", "-".repeat(130));

        for room in rooms {
            let public_id: String = room.get("public_id");
            let request_id: String = room.get("request_public_id");
            let participants: String = room.get("participants");
            let created_at: String = room.get("created_at");

            println!(
                "{:<26} {:<26} {:<40} {:<34}",
                public_id, request_id, participants, created_at
            );
        }
    }

    println!("\n=== MESSAGES ===");
    let messages = sqlx::query(
        r#"
        SELECT m.seq, m.public_id, r.public_id AS room_public_id, m.sender_id, m.content, m.created_at
        FROM messages m
        JOIN chat_rooms r ON r.id = m.room_id
        ORDER BY m.seq ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch messages")?;

    if messages.is_empty() {
        println!("No messages found in database");
    } else {
        println!("Found {} messages:", messages.len());
        println!(
            "{:<6} {:<26} {:<26} {:<20} {:<50} {:<34}",
            "Seq", "Public ID", "Room", "Sender", "Content (truncated)", "Created At"
        );
        println!("{}", "-".repeat(170));

        for message in messages {
            let seq: i64 = message.get("seq");
            let public_id: String = message.get("public_id");
            let room_id: String = message.get("room_public_id");
            let sender_id: String = message.get("sender_id");
            let content: String = message.get("content");
            let created_at: String = message.get("created_at");

            println!(
                "{:<6} {:<26} {:<26} {:<20} {:<50} {:<34}",
                seq,
                public_id,
                room_id,
                sender_id,
                truncate(&content, 47),
                created_at
            );
        }
    }

    Ok(())
}

fn truncate(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let head: String = content.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["parley-server"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn issue_token_takes_identity_and_optional_ttl() {
        let cli = Cli::try_parse_from(["parley-server", "issue-token", "u1", "--ttl-seconds", "60"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::IssueToken {
                identity: "u1".into(),
                ttl_seconds: Some(60),
            })
        );
    }

    #[test]
    fn issue_token_requires_identity() {
        assert!(Cli::try_parse_from(["parley-server", "issue-token"]).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 47), "short");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}
