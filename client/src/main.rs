use clap::Parser;
use client::actions::ActionClient;
use client::network::run_session;
use client::session::ClientSyncSession;
use log::{error, info};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the sync server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000/game")]
    server: String,

    /// HTTP root of the sync server, used for action dispatch
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    http: String,

    /// Channel to subscribe to (repeatable)
    #[arg(short = 'c', long = "channel", default_value = "Room:HomeRoom")]
    channels: Vec<String>,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value = "1000")]
    retry_ms: u64,

    /// Dispatch a WriteFile action once at startup
    #[arg(long, num_args = 2, value_names = ["PATH", "VALUE"])]
    write_file: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let session = ClientSyncSession::new();
    let subscriptions: Vec<_> = args
        .channels
        .iter()
        .map(|channel| {
            let name = channel.clone();
            session.subscribe(channel, move |value| match value {
                Some(data) => info!("{} -> {}", name, data),
                None => info!("{} -> (absent)", name),
            })
        })
        .collect();

    if let Some([path, value]) = args.write_file.as_deref() {
        let actions = ActionClient::new(&args.http);
        match actions.write_file(path, value).await {
            Ok(result) => info!("Wrote {} ({})", result.path, result.written),
            Err(e) => error!("WriteFile failed: {}", e),
        }
    }

    tokio::select! {
        _ = run_session(args.server, session, Duration::from_millis(args.retry_ms)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    for subscription in subscriptions {
        subscription.unsubscribe();
    }

    Ok(())
}
