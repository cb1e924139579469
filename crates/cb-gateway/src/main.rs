//! callbridge: Twilio Voice to OmniChat WhatsApp bridge
//!
//! Usage:
//!   callbridge           - Start the webhook server
//!   callbridge --help    - Show help
//!   callbridge --version - Show version

use std::net::{IpAddr, SocketAddr};

use cb_core::Config;
use cb_omnichat::OmniChat;
use cb_voice::{CallFlow, SignatureGate, VoiceServer};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Webhook server
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args(std::env::args().skip(1)) {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("callbridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting callbridge...");

    run_server(config).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> RunMode
where
    I: IntoIterator<Item = String>,
{
    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("callbridge - Twilio Voice to OmniChat WhatsApp bridge");
    println!();
    println!("Usage:");
    println!("  callbridge           Start the webhook server");
    println!("  callbridge --help    Show this help message");
    println!("  callbridge --version Show version");
    println!();
    println!("Settings are read from ./callbridge.toml when present;");
    println!("environment variables (and .env) take precedence.");
    println!();
    println!("Environment Variables:");
    println!("  PORT                     Listen port (default: 3000)");
    println!("  BIND_ADDRESS             Listen address (default: 0.0.0.0)");
    println!("  TWILIO_AUTH_TOKEN        Twilio auth token (required unless validation is off)");
    println!("  TWILIO_VALIDATE          Verify X-Twilio-Signature (default: true)");
    println!("  TWILIO_WEBHOOK_BASE_URL  Public base URL Twilio calls, e.g. https://bridge.example.com");
    println!("  OMNI_BASE_URL            OmniChat API (default: https://api.omnichat.co.uk)");
    println!("  OMNI_USERNAME            OmniChat username (required)");
    println!("  OMNI_PASSWORD            OmniChat password (required)");
    println!("  OMNI_APP_NAME            Calling application name (required)");
    println!("  OMNI_API_ACCOUNT_ID      OmniChat account ID (required)");
    println!("  OMNI_TEMPLATE_ID         WhatsApp template ID (required)");
    println!("  OMNI_BROADCAST_MESSAGE   Broadcast message text (default: empty)");
    println!("  RUST_LOG                 Log filter (default: info)");
}

/// Run the webhook server until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let omnichat = OmniChat::from_config(&config.omnichat)
        .map_err(|e| anyhow::anyhow!("Failed to create OmniChat client: {}", e))?;
    let flow = CallFlow::new(omnichat.resolver(), omnichat.dispatcher());

    let gate = SignatureGate::from_config(&config.twilio)
        .map_err(|e| anyhow::anyhow!("Twilio validation setup failed: {}", e))?;

    let addr = listen_addr(&config.server.bind, config.server.port)?;
    let server = VoiceServer::new(addr, flow, gate);

    tracing::info!("Press Ctrl+C to exit");

    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down...");
        })
        .await
        .map_err(|e| anyhow::anyhow!("Webhook server error: {}", e))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn listen_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDRESS {:?}: {}", bind, e))?;
    Ok(SocketAddr::new(ip, port))
}
