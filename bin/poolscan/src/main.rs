use std::ops::ControlFlow;

use clap::Parser;
use log::{debug, error, info};
use tokio::signal;
use tokio::sync::broadcast;

use config::Config;
use geckoterminal::{GeckoTerminalClient, Transport};
use storage::{CsvStore, TableStore};
use tabular::Table;

mod scanner;

#[derive(Parser, Debug)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Scan a single network instead of the configured list
    #[arg(short, long)]
    network: Option<String>,

    /// Keep polling for new pools until interrupted
    #[arg(short, long)]
    watch: bool,

    /// Override the configured output path
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    let args = Args::parse();
    debug!("Args: {:?}", args);

    let config = Config::from_file(&args.config).expect("Failed to load config file");

    let client = GeckoTerminalClient::from_config(&config.geckoterminal)
        .expect("Failed to build GeckoTerminal client");

    let mut output = config.output.clone();
    if let Some(path) = args.output.clone() {
        output.path = path;
    }
    let store = CsvStore::from_config(&output);

    let networks = match &args.network {
        Some(network) => vec![network.clone()],
        None => config.scanner.networks.to_vec(),
    };

    if args.watch {
        run_watch(&client, &config, networks, &store).await;
    } else {
        run_scan(&client, &config, networks, &store).await;
    }
}

async fn run_scan<T: Transport>(
    client: &GeckoTerminalClient<T>,
    config: &Config,
    networks: Vec<String>,
    store: &CsvStore,
) {
    info!("Starting pool scan");

    let table = scanner::scan(client, &config.scanner, networks).await;
    info!("{} pools above the volume threshold", table.len());

    if let Err(err) = store.save(&table) {
        error!("Failed to write output: {}", err);
        std::process::exit(1);
    }

    info!("Scan written to {}", store.path());
}

async fn run_watch<T: Transport>(
    client: &GeckoTerminalClient<T>,
    config: &Config,
    networks: Vec<String>,
    store: &CsvStore,
) {
    let Some(network) = networks.first().cloned() else {
        error!("Watch mode needs a network, via --network or the scanner config");
        std::process::exit(2);
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(shutdown_signal(shutdown_tx));

    info!(
        "Watching new pools on {} every {}s",
        network, config.scanner.poll_interval_sec
    );

    let mut collected = Table::new();
    client
        .watch_new_pools(
            &network,
            config.scanner.include.as_deref(),
            config.scanner.poll_interval(),
            shutdown_rx,
            |fetch| {
                if let Some(err) = &fetch.error {
                    error!("Sweep stopped early: {}", err);
                }
                if !fetch.table.is_empty() {
                    info!("Collected {} new pools", fetch.table.len());
                    collected.append(fetch.table);
                    let snapshot =
                        scanner::aggregate(collected.clone(), config.scanner.min_volume_usd_h24);
                    if let Err(err) = store.save(&snapshot) {
                        error!("Failed to write output: {}", err);
                    }
                }
                ControlFlow::Continue(())
            },
        )
        .await;

    info!("Watcher stopped.");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Unable to handle ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
    let _ = shutdown_tx.send(());
}
