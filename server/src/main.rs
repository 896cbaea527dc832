use clap::Parser;
use log::info;
use server::actions::ActionRegistry;
use server::config::ServerConfig;
use server::network::Server;
use shared::{DEFAULT_PORT, HOME_ROOM};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Room clock period in milliseconds (0 disables the clock)
    #[arg(long, default_value = "1000")]
    clock_interval_ms: u64,

    /// Channel the room clock writes to
    #[arg(long, default_value = HOME_ROOM)]
    room: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        clock_interval: ServerConfig::clock_from_millis(args.clock_interval_ms),
        room_channel: args.room,
    };

    let registry = ActionRegistry::with_builtins();
    info!("Registered actions: {:?}", registry.action_types());

    let server = Server::bind(config, registry).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
