//! trailtalk CLI — peer-to-peer chat and friend requests for the trail.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use trailtalk_daemon::{setup, Daemon, LinkEvent, LinkHandle};
use trailtalk_discovery::{MdnsDiscovery, Peer};
use trailtalk_protocol::TcpTransport;

#[derive(Parser)]
#[command(
    name = "trailtalk",
    about = "Chat with nearby peers without a network connection",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the peer link in the foreground with an interactive prompt.
    Start {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Print this machine's persistent peer ID.
    Id,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => run(config).await,
        Commands::Init { force } => init_config(force),
        Commands::Id => {
            let id = setup::load_or_create_peer_id(&setup::config_dir())?;
            println!("{id}");
            Ok(())
        }
    }
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = setup::default_config_path();
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::create_dir_all(setup::config_dir())?;
    let config = trailtalk_daemon::Config::default();
    std::fs::write(&path, toml::to_string_pretty(&config)?)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let config = setup::load_config(config_path.as_deref())?;
    let peer_id = setup::load_or_create_peer_id(&setup::config_dir())?;
    let user_id = setup::effective_user_id(&config, peer_id);
    let user_name = config.identity.name.clone();

    let transport = Arc::new(TcpTransport::new(config.bind_addr()?, config.dial_timeout()));
    let discovery = Box::new(MdnsDiscovery::new()?);
    let (link_tx, link_rx) = mpsc::channel(256);

    let mut daemon = Daemon::new(config, peer_id, transport, discovery, link_tx);
    let handle = daemon.handle();
    let daemon_task = tokio::spawn(async move {
        if let Err(e) = daemon.run().await {
            tracing::error!(error = %e, "daemon exited with error");
        }
    });

    handle.start_discovery().await?;
    println!("Discovering peers. Commands: /peers, /connect <n>, /friend, /quit; anything else is chat.");

    prompt_loop(&handle, link_rx, &user_id, &user_name).await?;

    let _ = handle.shutdown().await;
    let _ = daemon_task.await;
    Ok(())
}

/// Interactive prompt: renders link events and dispatches commands.
async fn prompt_loop(
    handle: &LinkHandle,
    mut events: mpsc::Receiver<LinkEvent>,
    user_id: &str,
    user_name: &str,
) -> anyhow::Result<()> {
    let mut peers: Vec<Peer> = Vec::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                render_event(&event, &mut peers);
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                    ["/quit"] => break,
                    ["/peers"] => {
                        if peers.is_empty() {
                            println!("no peers discovered yet");
                        }
                        for (i, peer) in peers.iter().enumerate() {
                            println!("[{i}] {} at {}", peer.name, peer.address);
                        }
                    }
                    ["/connect", index] => match index.parse::<usize>().ok().and_then(|i| peers.get(i)) {
                        Some(peer) => handle.connect_to_peer(peer.clone()).await?,
                        None => println!("no such peer (try /peers)"),
                    },
                    ["/friend"] => handle.send_friend_request(user_id, user_name).await?,
                    _ => handle.send_chat_message(line).await?,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn render_event(event: &LinkEvent, peers: &mut Vec<Peer>) {
    match event {
        LinkEvent::PeerDiscovered(peer) => {
            println!("[{}] {} at {}", peers.len(), peer.name, peer.address);
            peers.push(peer.clone());
        }
        LinkEvent::PeerConnected(peer) => println!("connected to {}", peer.name),
        LinkEvent::FriendRequest { user_id, user_name } => {
            println!("friend request from {user_name} ({user_id})");
        }
        LinkEvent::Chat { text } => println!("peer: {text}"),
        LinkEvent::ConnectionError { message } => eprintln!("error: {message}"),
        LinkEvent::Disconnected => println!("peer disconnected"),
    }
}
