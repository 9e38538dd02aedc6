use clap::Parser;
use log::info;
use server::connection::{serve_tcp, serve_ws};
use server::{start, ServerConfig, DEFAULT_MAX_NAME_LEN};
use tokio::net::TcpListener;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port for the line-based endpoint
    #[clap(short, long, default_value = "4000")]
    port: u16,

    /// WebSocket port for browser clients
    #[clap(short = 'w', long, default_value = "4001")]
    ws_port: u16,

    /// Maximum accepted display-name length
    #[clap(long, default_value_t = DEFAULT_MAX_NAME_LEN)]
    max_name_len: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let tcp_addr = format!("{}:{}", args.host, args.port);
    let ws_addr = format!("{}:{}", args.host, args.ws_port);

    info!(
        "Starting typing-competition server on TCP: {}, WebSocket: {}",
        tcp_addr, ws_addr
    );

    let tcp_listener = TcpListener::bind(&tcp_addr).await?;
    let ws_listener = TcpListener::bind(&ws_addr).await?;
    info!("TCP endpoint listening on {}", tcp_addr);
    info!("WebSocket endpoint listening on {}", ws_addr);

    let state = start(ServerConfig {
        max_name_len: args.max_name_len,
        ..ServerConfig::default()
    });

    let ws_state = state.clone();
    tokio::spawn(async move {
        info!("WebSocket endpoint started");
        serve_ws(ws_listener, ws_state).await;
    });

    info!("TCP endpoint started");
    serve_tcp(tcp_listener, state).await;

    Ok(())
}
