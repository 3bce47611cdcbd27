// ledgerwatch - print every transaction touching the watched addresses
//
// Each delivered transaction is recorded (sled store or one JSON file per
// transaction), so a restart only reports what was missed while stopped,
// as long as the node still retains that history.

use anyhow::{Context, Result};
use clap::Parser;
use ledgerwatch::config::DEFAULT_CONFIG_PATH;
use ledgerwatch::report::ActivityLine;
use ledgerwatch::storage::{DurabilityGate, FileGate, SledGate};
use ledgerwatch::{Monitor, MonitorConfig, MonitorEvent, RpcLedgerClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "ledgerwatch", version, about = "Watch ledger addresses for new transactions")]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    conf: PathBuf,

    /// Use the test network settings from the [altnet] section
    #[arg(short, long)]
    altnet: bool,

    /// Addresses to watch (overrides monitor.addresses)
    #[arg(value_name = "ADDRESS")]
    addresses: Vec<String>,
}

fn open_gate(config: &MonitorConfig) -> Result<Arc<dyn DurabilityGate>> {
    match &config.record_format {
        Some(format) => {
            info!(format = %format, "recording deliveries as files");
            Ok(Arc::new(FileGate::new(format)?))
        }
        None => {
            info!(path = %config.store_path.display(), "recording deliveries in sled store");
            let gate = SledGate::open(&config.store_path)
                .with_context(|| format!("opening {}", config.store_path.display()))?;
            Ok(Arc::new(gate))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(conf = %cli.conf.display(), "reading configuration");

    let config = MonitorConfig::load(&cli.conf, cli.altnet)?.with_addresses(cli.addresses);
    config.validate()?;

    let client = Arc::new(RpcLedgerClient::new(config.rpc_config())?);
    let gate = open_gate(&config)?;

    let mut monitor = Monitor::new(client, gate);
    for address in &config.addresses {
        monitor.add_address(address.clone());
    }
    info!(addresses = config.addresses.len(), server = %config.server, "starting ledgerwatch");

    let mut events = monitor.subscribe();
    let nicknames = config.nicknames.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                MonitorEvent::AddressActivity {
                    affected_address,
                    transaction,
                    ..
                } => {
                    let line = ActivityLine {
                        transaction: &transaction,
                        affected_address: &affected_address,
                        nicknames: &nicknames,
                    };
                    println!("{}", line);
                }
                MonitorEvent::Error(report) => {
                    error!(code = %report.code, data = ?report.data, "{}", report.message);
                }
                MonitorEvent::Connected(info) => {
                    debug!(complete_ledgers = %info.complete_ledgers, "connected");
                }
                other => debug!(event = ?other, "monitor event"),
            }
        }
    });

    if let Err(e) = monitor.connect().await {
        error!("failed to connect: {}", e);
        std::process::exit(1);
    }
    info!("connected and waiting for ledger events");

    let interrupted = tokio::select! {
        result = monitor.run() => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        info!("interrupted, disconnecting");
        let _ = monitor.disconnect().await;
    }

    drop(monitor);
    let _ = printer.await;
    Ok(())
}
