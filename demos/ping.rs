//! Connect, ping, watch server events.
//!
//! Demonstrates:
//! - Building a client from environment settings
//! - Subscribing to lifecycle and server events
//! - Executing actions with and without a timeout
//! - Deliberate close
//!
//! Environment:
//!   MFP_HOST (default 127.0.0.1), MFP_PORT (default 23333),
//!   MFP_TOKEN, or MFP_USER and MFP_PASSWORD
//!
//! Usage:
//!   cargo run --example ping
//!   cargo run --example ping -- --debug
//!   cargo run --example ping -- --no-wait

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, bail};
use mfp_client::{Action, Client, ClientConfig, ClientEvent, EventFilter};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    no_wait: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "mfp_client=debug"
    } else {
        "mfp_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== MFP ping ===\n");

    let host = std::env::var("MFP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("MFP_PORT")
        .unwrap_or_else(|_| "23333".into())
        .parse()
        .context("MFP_PORT is not a port number")?;

    let builder = ClientConfig::builder().host(host).port(port);
    let builder = match (
        std::env::var("MFP_TOKEN"),
        std::env::var("MFP_USER"),
        std::env::var("MFP_PASSWORD"),
    ) {
        (Ok(token), _, _) => builder.token(token),
        (_, Ok(user), Ok(password)) => builder.login(user, password),
        _ => bail!("set MFP_TOKEN, or MFP_USER and MFP_PASSWORD"),
    };
    let config = builder.build()?;

    // ========================================================================
    // Subscribe
    // ========================================================================

    let client = Client::new(config)?;
    client.subscribe(EventFilter::Info, |event| {
        if let ClientEvent::Info(info) = event {
            println!("[info]  {} {} (api v{})", info.name, info.version, info.api_version);
        }
    });
    client.subscribe(EventFilter::Close, |event| {
        if let ClientEvent::Close(close) = event {
            println!(
                "[close] code={} reason={:?} reconnect={}",
                close.code, close.reason, close.reconnect
            );
        }
    });
    client.on("instance_log", |event| {
        if let ClientEvent::Server(server) = event {
            println!("[log]   {}", server.data);
        }
    });

    // ========================================================================
    // Connect and ping
    // ========================================================================

    println!("[Connect] {}", client.config().endpoint());
    client.connect().await?;
    println!("          ✓ Connected\n");

    let pong = client.execute_action(Action::Ping, None).await?;
    println!("[Ping] retcode={} status={:?}", pong.retcode, pong.status);

    let listing = client
        .execute_action_with_timeout(
            Action::GetDirectoryInfo,
            Some(serde_json::json!({ "path": "/" })),
            Duration::from_secs(5),
        )
        .await?;
    println!("[Dir]  {}", listing.data);

    if !args.no_wait {
        println!("\nPress Ctrl+C to exit...");
        tokio::signal::ctrl_c().await.ok();
    }

    client.close().await;
    println!("\n✓ Closed (closed={})", client.closed());
    Ok(())
}
