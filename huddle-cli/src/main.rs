use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use huddle_client::{ClientConfig, TransportClient};
use huddle_core::{Envelope, EnvelopeBody, PresenceStatus, RoomId, UserId, signaling};
use huddle_server::ServerConfig;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Call coordination server and text-only room client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
    /// Join a room and chat from the terminal.
    Chat {
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        room: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve { addr } => {
            println!("{}", "🚀 Starting coordination server...".green().bold());
            huddle_server::run(ServerConfig { bind_addr: addr }).await
        }
        Commands::Chat {
            url,
            user,
            name,
            room,
        } => {
            let name = match name {
                Some(name) => name,
                None => Input::<String>::new()
                    .with_prompt("Display name")
                    .default(user.clone())
                    .interact_text()
                    .context("Failed to read display name")?,
            };
            chat(url, UserId::from(user), name, RoomId::from(room)).await
        }
    }
}

async fn chat(url: String, user: UserId, name: String, room: RoomId) -> Result<()> {
    let transport = TransportClient::with_websocket(ClientConfig::new(url.clone()));

    let me = user.clone();
    transport.on_message(move |envelope| print_envelope(&me, envelope));
    transport.on_connection_change(|up| {
        if *up {
            println!("{}", "● connected".green());
        } else {
            println!("{}", "○ connection lost".red());
        }
    });

    if !transport.connect(user.clone(), name.clone()).await {
        bail!("Could not reach {}", url);
    }
    transport.send(signaling::join_room(user.clone(), room.clone(), Some(name)));
    println!(
        "{} {}",
        "💬 Joined room".cyan(),
        room.as_str().bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let message = signaling::chat_message(user.clone(), room.as_str(), text, None, Vec::new());
        if !transport.send(message) {
            println!("{}", "✗ not sent, channel is down".red());
        }
    }

    transport.send(signaling::leave_room(user, room));
    transport.disconnect();
    Ok(())
}

fn print_envelope(me: &UserId, envelope: &Envelope) {
    match &envelope.body {
        EnvelopeBody::Message(m) if &m.sender_id != me => {
            println!("{} {}", format!("{}:", m.sender_id).bold(), m.text);
        }
        EnvelopeBody::UserJoined(m) => {
            let who = m.username.as_deref().unwrap_or(m.user_id.as_str());
            println!("{}", format!("→ {} joined", who).green());
        }
        EnvelopeBody::UserLeft(m) => {
            println!("{}", format!("← {} left", m.user_id).yellow());
        }
        EnvelopeBody::UserStatus(s) => {
            let status = match s.status {
                PresenceStatus::Online => s.status.to_string().green(),
                PresenceStatus::Away => s.status.to_string().yellow(),
                PresenceStatus::Offline => s.status.to_string().dimmed(),
            };
            println!("{} is {}", s.user_id, status);
        }
        EnvelopeBody::CallSignaling(s) => {
            println!(
                "{}",
                format!("📞 {} sent {}", s.sender_id, s.signal_type).dimmed()
            );
        }
        _ => {}
    }
}
