//! botsub server
//!
//! Usage: `botsub [ctx]`. Passing `ctx` keys subscriptions by topic and
//! sector; without it the configuration decides (topic only by default).

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use botsub::config::{Settings, context_aware_from_arg, load_config};
use botsub::persistence::Persistence;
use botsub::server;
use botsub::utils::{BrokerError, logging};

#[derive(Parser)]
#[command(name = "botsub", about = "Durable publish/subscribe broker for bots")]
struct Cli {
    /// `ctx` to subscribe by topic and sector
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(&Settings::default().logging);
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging);

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut settings: Settings) -> Result<(), BrokerError> {
    settings.broker.context_aware =
        context_aware_from_arg(cli.mode.as_deref(), settings.broker.context_aware)?;

    let store = Persistence::open(&settings.persistence.path)?;
    let shutdown = CancellationToken::new();
    let server = server::start(&settings, store, shutdown.clone()).await?;
    info!(addr = %server.local_addr(), "botsub ready");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Exiting gracefully.");
            shutdown.cancel();
        }
    });

    server.wait().await
}
