use std::ops::ControlFlow;
use std::time::Duration;

use log::{error, info};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use config::config::GeckoTerminalConfig;
use tabular::{flatten_object, Table};

use crate::transport::{HttpTransport, Transport, TransportError};

/// GeckoTerminal REST client. One instance per base URL; every endpoint
/// method performs a single GET (or a page loop) and returns a flat table.
#[derive(Debug)]
pub struct GeckoTerminalClient<T: Transport> {
    transport: T,
    base_url: String,
    page_delay: Duration,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid api version for Accept header: {0}")]
    InvalidApiVersion(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Error on page {page}: {source}")]
    Page { page: u32, source: TransportError },
}

/// Outcome of a page loop: everything collected before the loop stopped,
/// plus the error that stopped it early, if any. Callers that only care
/// about the rows use [`PaginatedFetch::into_table`].
#[derive(Debug, Default)]
pub struct PaginatedFetch {
    pub table: Table,
    pub pages: u32,
    pub error: Option<ClientError>,
}

impl PaginatedFetch {
    pub fn into_table(self) -> Table {
        self.table
    }
}

impl GeckoTerminalClient<HttpTransport> {
    pub fn from_config(config: &GeckoTerminalConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.api_version, config.request_timeout())
            .map_err(|_| ClientError::InvalidApiVersion(config.api_version.clone()))?;

        Ok(GeckoTerminalClient::with_transport(
            transport,
            config.base_url.clone(),
            config.page_delay(),
        ))
    }
}

impl<T: Transport> GeckoTerminalClient<T> {
    pub fn with_transport(transport: T, base_url: String, page_delay: Duration) -> Self {
        GeckoTerminalClient { transport, base_url, page_delay }
    }

    /// Single GET against `base_url + endpoint`, response converted into a
    /// flat table: a root list (or a `data`/`results` list) becomes one row
    /// per element, anything else is flattened into a single row. The
    /// `attributes` and nested pool columns are always promoted.
    pub async fn request(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> Result<Table, ClientError> {
        let full_url = format!("{}{}", self.base_url, endpoint);
        info!("Making API request to {}", full_url);

        let data = self.transport.get_json(&full_url, query).await?;

        let mut table = match root_records(&data) {
            Some(records) => Table::from_objects_shallow(records),
            None => {
                let mut single = Table::new();
                single.push_row(flatten_object(&data));
                single
            }
        };
        table.normalize();

        Ok(table)
    }

    /// Silent-degrade variant: any error is logged with the endpoint and
    /// swallowed into an empty table, so "failed" and "no results" look the
    /// same to the caller.
    pub async fn request_or_empty(&self, endpoint: &str, query: &[(String, String)]) -> Table {
        match self.request(endpoint, query).await {
            Ok(table) => table,
            Err(err) => {
                error!("Request to {} failed: {}", endpoint, err);
                Table::new()
            }
        }
    }

    /// Fetch pages starting at 1, merging a `page` parameter into the
    /// initial query each call. Stops at the first page with neither a
    /// non-empty `data` nor `results` list; a transport error stops the loop
    /// and is recorded while collected pages are kept. A fixed pause of
    /// `60 / rate_limit` seconds follows each successful page.
    pub async fn paginate(
        &self,
        endpoint: &str,
        initial_query: &[(String, String)],
    ) -> PaginatedFetch {
        let full_url = format!("{}{}", self.base_url, endpoint);
        let mut collected = Vec::new();
        let mut page: u32 = 1;
        let mut error = None;

        loop {
            let mut query = vec![("page".to_string(), page.to_string())];
            query.extend(initial_query.iter().cloned());

            info!("Making API request to {}", full_url);
            let data = match self.transport.get_json(&full_url, &query).await {
                Ok(data) => data,
                Err(source) => {
                    error = Some(ClientError::Page { page, source });
                    break;
                }
            };

            let Some(records) = page_records(&data) else {
                info!("No data found for page {}", page);
                break;
            };

            collected.push(Table::from_records(records));

            page += 1;
            tokio::time::sleep(self.page_delay).await;
        }

        let pages = collected.len() as u32;
        PaginatedFetch { table: Table::concat(collected), pages, error }
    }

    /// Silent-degrade variant of the page loop: log whatever stopped it,
    /// return only the collected rows.
    pub async fn paginate_or_empty(
        &self,
        endpoint: &str,
        initial_query: &[(String, String)],
    ) -> Table {
        let fetch = self.paginate(endpoint, initial_query).await;
        if let Some(err) = &fetch.error {
            error!("Paginated request to {} stopped: {}", endpoint, err);
        }
        fetch.into_table()
    }

    pub async fn get_networks(&self) -> Result<Table, ClientError> {
        self.request("/networks", &[]).await
    }

    pub async fn get_new_pools(&self, network: &str, include: Option<&str>) -> PaginatedFetch {
        let query = query_params(&[("include", include)]);
        self.paginate(&format!("/networks/{}/new_pools", network), &query).await
    }

    pub async fn get_dexes(
        &self,
        network: &str,
        page: u32,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let query = page_query(page, include);
        self.request(&format!("/networks/{}/dexes", network), &query).await
    }

    pub async fn get_pool_by_address(
        &self,
        network: &str,
        address: &str,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let query = query_params(&[("include", include)]);
        self.request(&format!("/networks/{}/pools/{}", network, address), &query).await
    }

    pub async fn get_pools_by_addresses(
        &self,
        network: &str,
        addresses: &[&str],
        page: u32,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let query = page_query(page, include);
        self.request(
            &format!("/networks/{}/pools/multi/{}", network, addresses.join(",")),
            &query,
        )
        .await
    }

    pub async fn get_trending_pools(
        &self,
        network: &str,
        page: u32,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let query = page_query(page, include);
        self.request(&format!("/networks/{}/trending_pools", network), &query).await
    }

    pub async fn get_global_trending_pools(
        &self,
        page: u32,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let query = page_query(page, include);
        self.request("/networks/trending_pools", &query).await
    }

    pub async fn search_pools(
        &self,
        search: &str,
        network: Option<&str>,
        page: u32,
        include: Option<&str>,
    ) -> Result<Table, ClientError> {
        let mut query = vec![
            ("query".to_string(), search.to_string()),
            ("page".to_string(), page.to_string()),
        ];
        query.extend(query_params(&[("network", network), ("include", include)]));
        self.request("/search/pools", &query).await
    }

    /// Poll new pools for one network until the shutdown channel fires or
    /// the callback breaks. Each sweep's outcome is handed to the callback
    /// whole, errors included.
    pub async fn watch_new_pools<F>(
        &self,
        network: &str,
        include: Option<&str>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
        mut on_batch: F,
    ) where
        F: FnMut(PaginatedFetch) -> ControlFlow<()>,
    {
        loop {
            let fetch = self.get_new_pools(network, include).await;

            if let ControlFlow::Break(()) = on_batch(fetch) {
                break;
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

fn root_records(data: &Value) -> Option<&[Value]> {
    match data {
        Value::Array(list) => Some(list),
        Value::Object(map) => {
            if let Some(Value::Array(list)) = map.get("data") {
                Some(list)
            } else if let Some(Value::Array(list)) = map.get("results") {
                Some(list)
            } else {
                None
            }
        }
        _ => None,
    }
}

// A page only counts if it carries a non-empty data or results list
fn page_records(data: &Value) -> Option<&[Value]> {
    let map = data.as_object()?;
    for key in ["data", "results"] {
        if let Some(Value::Array(list)) = map.get(key) {
            if !list.is_empty() {
                return Some(list);
            }
        }
    }
    None
}

fn query_params(params: &[(&str, Option<&str>)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string())))
        .collect()
}

fn page_query(page: u32, include: Option<&str>) -> Vec<(String, String)> {
    let mut query = vec![("page".to_string(), page.to_string())];
    query.extend(query_params(&[("include", include)]));
    query
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::ops::ControlFlow;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    use super::GeckoTerminalClient;
    use crate::transport::{Transport, TransportError};

    struct RecordedCall {
        url: String,
        query: Vec<(String, String)>,
        at: Instant,
    }

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, TransportError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, TransportError>>) -> Self {
            ScriptedTransport {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn get_json(
            &self,
            url: &str,
            query: &[(String, String)],
        ) -> Result<Value, TransportError> {
            self.calls.lock().unwrap().push(RecordedCall {
                url: url.to_string(),
                query: query.to_vec(),
                at: Instant::now(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    fn connect_error() -> TransportError {
        TransportError::Connect {
            url: "https://api.test/api/v2".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn client(responses: Vec<Result<Value, TransportError>>) -> GeckoTerminalClient<ScriptedTransport> {
        GeckoTerminalClient::with_transport(
            ScriptedTransport::new(responses),
            "https://api.test/api/v2".to_string(),
            Duration::from_secs(2),
        )
    }

    fn pool(id: &str) -> Value {
        json!({
            "id": id,
            "type": "pool",
            "attributes": {
                "name": format!("{} pair", id),
                "pool_created_at": "2024-05-01T00:00:00Z",
                "volume_usd": { "h24": "3000.0", "h6": "900.0" }
            }
        })
    }

    #[tokio::test]
    async fn test_list_root_one_row_per_element() {
        let client = client(vec![Ok(json!([
            { "id": "eth", "name": "Ethereum" },
            { "id": "solana", "name": "Solana" }
        ]))]);

        let table = client.request("/networks", &[]).await.unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "id"), Some(&json!("eth")));
        assert_eq!(table.cell(1, "name"), Some(&json!("Solana")));
    }

    #[tokio::test]
    async fn test_data_wrapper_rows_come_from_data_not_wrapper() {
        let client = client(vec![Ok(json!({
            "data": [pool("eth_0xa"), pool("eth_0xb")],
            "meta": { "total": 2 }
        }))]);

        let table = client.request("/networks/eth/trending_pools", &[]).await.unwrap();

        assert_eq!(table.len(), 2);
        assert!(!table.columns().contains(&"meta.total".to_string()));
    }

    #[tokio::test]
    async fn test_results_wrapper_rows() {
        let client = client(vec![Ok(json!({
            "results": [ { "id": "a" }, { "id": "b" }, { "id": "c" } ]
        }))]);

        let table = client.request("/search/pools", &[]).await.unwrap();

        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn test_generic_object_flattened_into_single_row() {
        let client = client(vec![Ok(json!({
            "status": { "code": 200, "elapsed": "1ms" }
        }))]);

        let table = client.request("/status", &[]).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "status.code"), Some(&json!(200)));
        assert_eq!(table.cell(0, "status.elapsed"), Some(&json!("1ms")));
    }

    #[tokio::test]
    async fn test_attributes_column_never_survives() {
        let client = client(vec![Ok(json!({ "data": [pool("eth_0xa")] }))]);

        let table = client.request("/networks/eth/pools/0xa", &[]).await.unwrap();

        let columns = table.columns();
        assert!(!columns.contains(&"attributes".to_string()));
        assert!(columns.contains(&"name".to_string()));
        assert!(columns.contains(&"volume_usd.h24".to_string()));
        assert!(!columns.contains(&"volume_usd".to_string()));
    }

    #[tokio::test]
    async fn test_http_error_surfaces_and_or_empty_adapter_swallows_it() {
        let client = client(vec![
            Err(TransportError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                url: "https://api.test/api/v2/networks".to_string(),
            }),
            Err(TransportError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                url: "https://api.test/api/v2/networks".to_string(),
            }),
        ]);

        assert!(client.request("/networks", &[]).await.is_err());

        let table = client.request_or_empty("/networks", &[]).await;
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_repeated_calls_against_same_backend_are_idempotent() {
        let response = json!({ "data": [pool("eth_0xa"), pool("eth_0xb")] });
        let first = client(vec![Ok(response.clone())]);
        let second = client(vec![Ok(response)]);

        let table_a = first.request("/networks/eth/trending_pools", &[]).await.unwrap();
        let table_b = second.request("/networks/eth/trending_pools", &[]).await.unwrap();

        assert_eq!(table_a, table_b);
    }

    #[tokio::test]
    async fn test_none_params_omitted_from_query() {
        let client = client(vec![Ok(json!({ "data": [] })), Ok(json!({ "data": [] }))]);

        client.get_dexes("eth", 1, None).await.unwrap();
        client.get_dexes("eth", 2, Some("network")).await.unwrap();

        let calls = client.transport.calls.lock().unwrap();
        assert_eq!(calls[0].url, "https://api.test/api/v2/networks/eth/dexes");
        assert_eq!(calls[0].query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(
            calls[1].query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("include".to_string(), "network".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_search_pools_network_is_optional() {
        let client = client(vec![Ok(json!({ "data": [] })), Ok(json!({ "data": [] }))]);

        client.search_pools("ETH", None, 1, None).await.unwrap();
        client.search_pools("ETH", Some("eth"), 1, None).await.unwrap();

        let calls = client.transport.calls.lock().unwrap();
        assert_eq!(
            calls[0].query,
            vec![
                ("query".to_string(), "ETH".to_string()),
                ("page".to_string(), "1".to_string())
            ]
        );
        assert!(calls[1].query.contains(&("network".to_string(), "eth".to_string())));
    }

    #[tokio::test]
    async fn test_multi_pool_addresses_are_comma_joined() {
        let client = client(vec![Ok(json!({ "data": [] }))]);

        client.get_pools_by_addresses("eth", &["0xa", "0xb"], 1, None).await.unwrap();

        let calls = client.transport.calls.lock().unwrap();
        assert_eq!(calls[0].url, "https://api.test/api/v2/networks/eth/pools/multi/0xa,0xb");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_at_first_empty_page() {
        let client = client(vec![
            Ok(json!({ "data": [pool("eth_0xa")] })),
            Ok(json!({ "data": [pool("eth_0xb")] })),
            Ok(json!({ "data": [pool("eth_0xc")] })),
            Ok(json!({ "data": [] })),
        ]);

        let fetch = client.get_new_pools("eth", None).await;

        assert_eq!(fetch.pages, 3);
        assert!(fetch.error.is_none());
        assert_eq!(fetch.table.len(), 3);
        assert_eq!(fetch.table.cell(0, "id"), Some(&json!("eth_0xa")));
        assert_eq!(fetch.table.cell(2, "id"), Some(&json!("eth_0xc")));
        // record-path flattening, so attributes stays as a dotted prefix
        assert_eq!(
            fetch.table.cell(0, "attributes.volume_usd.h24"),
            Some(&json!("3000.0"))
        );

        let calls = client.transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let page_values: Vec<&str> = calls
            .iter()
            .map(|call| {
                call.query
                    .iter()
                    .find(|(key, _)| key == "page")
                    .map(|(_, value)| value.as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(page_values, vec!["1", "2", "3", "4"]);

        // fixed 2s throttle between successful calls
        assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(2));
        assert_eq!(calls[2].at - calls[1].at, Duration::from_secs(2));
        assert_eq!(calls[3].at - calls[2].at, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_keeps_collected_pages_on_abort() {
        let client = client(vec![
            Ok(json!({ "data": [pool("eth_0xa")] })),
            Ok(json!({ "data": [pool("eth_0xb")] })),
            Err(connect_error()),
        ]);

        let fetch = client.get_new_pools("eth", Some("base_token")).await;

        assert_eq!(fetch.pages, 2);
        assert_eq!(fetch.table.len(), 2);
        assert!(fetch.error.is_some());
        assert_eq!(client.transport.calls.lock().unwrap().len(), 3);

        let table = client
            .paginate_or_empty("/networks/eth/new_pools", &[])
            .await;
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_reads_results_when_data_missing() {
        let client = client(vec![
            Ok(json!({ "results": [ { "id": "a" }, { "id": "b" } ] })),
            Ok(json!({ "results": [] })),
        ]);

        let fetch = client.paginate("/search/pools", &[]).await;

        assert_eq!(fetch.pages, 1);
        assert_eq!(fetch.table.len(), 2);
        assert!(fetch.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_stops_on_shutdown_signal() {
        let client = client(vec![
            Ok(json!({ "data": [pool("eth_0xa")] })),
            Ok(json!({ "data": [] })),
        ]);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut sweeps = 0;
        client
            .watch_new_pools("eth", None, Duration::from_secs(60), shutdown_rx, |fetch| {
                sweeps += 1;
                assert_eq!(fetch.table.len(), 1);
                shutdown_tx.send(()).unwrap();
                ControlFlow::Continue(())
            })
            .await;

        assert_eq!(sweeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_callback_break_terminates() {
        let client = client(vec![
            Ok(json!({ "data": [pool("eth_0xa")] })),
            Ok(json!({ "data": [] })),
            Ok(json!({ "data": [pool("eth_0xb")] })),
            Ok(json!({ "data": [] })),
        ]);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut sweeps = 0;
        client
            .watch_new_pools("eth", None, Duration::from_secs(60), shutdown_rx, |_fetch| {
                sweeps += 1;
                if sweeps == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        assert_eq!(sweeps, 2);
    }
}
