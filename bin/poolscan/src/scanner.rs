use log::{error, info};

use config::config::ScannerConfig;
use geckoterminal::{GeckoTerminalClient, Transport};
use tabular::Table;

const CREATED_AT_COLUMN: &str = "attributes.pool_created_at";
const VOLUME_COLUMN: &str = "attributes.volume_usd.h24";

/// One full sweep: new pools for every requested network, aggregated into a
/// single sorted and filtered table. Per-network failures are logged and
/// skipped so one bad network never sinks the sweep.
pub async fn scan<T: Transport>(
    client: &GeckoTerminalClient<T>,
    scanner: &ScannerConfig,
    networks: Vec<String>,
) -> Table {
    let networks = if networks.is_empty() { discover_networks(client).await } else { networks };

    let mut all_pools = Table::new();
    for network in &networks {
        info!("Fetching new pools for network: {}", network);
        let fetch = client.get_new_pools(network, scanner.include.as_deref()).await;
        if let Some(err) = &fetch.error {
            error!("New pools fetch for {} stopped early: {}", network, err);
        }
        all_pools.append(fetch.into_table());
    }

    aggregate(all_pools, scanner.min_volume_usd_h24)
}

/// Newest first, thin pools dropped, `chain` derived from the pool id
/// prefix.
pub fn aggregate(mut pools: Table, min_volume_usd_h24: f64) -> Table {
    pools.sort_desc_by(CREATED_AT_COLUMN);
    pools.coerce_f64(VOLUME_COLUMN);
    pools.filter_min_f64(VOLUME_COLUMN, min_volume_usd_h24);
    pools.derive_prefix_column("chain", "id", '_');
    pools
}

async fn discover_networks<T: Transport>(client: &GeckoTerminalClient<T>) -> Vec<String> {
    let networks = match client.get_networks().await {
        Ok(table) => table,
        Err(err) => {
            error!("Network discovery failed: {}", err);
            Table::new()
        }
    };

    networks
        .column_values("id")
        .filter_map(|value| value.as_str().map(String::from))
        .collect()
}
