use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::models::{TimeWindow, Transaction, TransactionPage};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Source of balance transactions, one page at a time
#[async_trait]
pub trait BalanceApi: Send + Sync {
    /// Fetch the page of transactions created inside `window` that follows
    /// the transaction with id `starting_after` (first page when `None`).
    async fn fetch_page(
        &self,
        credential: &str,
        window: &TimeWindow,
        starting_after: Option<&str>,
    ) -> Result<TransactionPage>;
}

/// Stream every transaction in `window`, following cursors until the last page
pub fn fetch_transactions<'a, A>(
    api: &'a A,
    credential: &'a str,
    window: TimeWindow,
) -> impl Stream<Item = Result<Transaction>> + 'a
where
    A: BalanceApi + ?Sized,
{
    try_stream! {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = api.fetch_page(credential, &window, cursor.as_deref()).await?;
            pages += 1;
            debug!("Fetched page {} with {} transactions", pages, page.data.len());

            let has_more = page.has_more;
            let last_id = page.data.last().map(|tx| tx.id.clone());

            for tx in page.data {
                yield tx;
            }

            match (has_more, last_id) {
                (true, Some(id)) => cursor = Some(id),
                _ => break,
            }
        }
    }
}

/// HTTP client for the processor's balance transaction listing
pub struct StripeClient {
    http: Client,
    base_url: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl StripeClient {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl BalanceApi for StripeClient {
    async fn fetch_page(
        &self,
        credential: &str,
        window: &TimeWindow,
        starting_after: Option<&str>,
    ) -> Result<TransactionPage> {
        let endpoint = format!("{}/v1/balance_transactions", self.base_url);

        let mut query = vec![
            ("created[gte]", window.start.to_string()),
            ("created[lt]", window.end.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(id) = starting_after {
            query.push(("starting_after", id.to_string()));
        }

        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(credential)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(ExportError::Fetch {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<TransactionPage>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            created: 1_709_301_600,
            amount: 100,
            fee: 3,
            description: None,
            source: None,
            transaction_type: "charge".to_string(),
            metadata: None,
        }
    }

    /// Serves fixed pages keyed by cursor and records every request
    struct PagedApi {
        pages: HashMap<Option<String>, Result<TransactionPage>>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl PagedApi {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, after: Option<&str>, ids: &[&str], has_more: bool) -> Self {
            let page = TransactionPage {
                data: ids.iter().map(|id| tx(id)).collect(),
                has_more,
            };
            self.pages.insert(after.map(str::to_string), Ok(page));
            self
        }

        fn failure(mut self, after: Option<&str>) -> Self {
            self.pages.insert(
                after.map(str::to_string),
                Err(ExportError::Fetch {
                    status: 500,
                    message: "boom".to_string(),
                }),
            );
            self
        }
    }

    #[async_trait]
    impl BalanceApi for PagedApi {
        async fn fetch_page(
            &self,
            _credential: &str,
            _window: &TimeWindow,
            starting_after: Option<&str>,
        ) -> Result<TransactionPage> {
            let key = starting_after.map(str::to_string);
            self.requests.lock().unwrap().push(key.clone());
            match self.pages.get(&key) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(_)) => Err(ExportError::Fetch {
                    status: 500,
                    message: "boom".to_string(),
                }),
                None => panic!("unexpected cursor {:?}", key),
            }
        }
    }

    const WINDOW: TimeWindow = TimeWindow { start: 0, end: 86_400 };

    #[tokio::test]
    async fn test_single_page() {
        let api = PagedApi::new().page(None, &["a", "b"], false);
        let txs: Vec<Transaction> = fetch_transactions(&api, "sk", WINDOW).try_collect().await.unwrap();

        assert_eq!(txs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_follows_cursor_until_exhausted() {
        let api = PagedApi::new()
            .page(None, &["a", "b"], true)
            .page(Some("b"), &["c", "d"], true)
            .page(Some("d"), &["e"], false);

        let txs: Vec<Transaction> = fetch_transactions(&api, "sk", WINDOW).try_collect().await.unwrap();

        assert_eq!(
            txs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d", "e"]
        );
        assert_eq!(
            *api.requests.lock().unwrap(),
            vec![None, Some("b".to_string()), Some("d".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_page_with_more_flag_stops() {
        let api = PagedApi::new().page(None, &[], true);
        let txs: Vec<Transaction> = fetch_transactions(&api, "sk", WINDOW).try_collect().await.unwrap();

        assert!(txs.is_empty());
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_on_later_page_surfaces() {
        let api = PagedApi::new().page(None, &["a"], true).failure(Some("a"));
        let result: Result<Vec<Transaction>> = fetch_transactions(&api, "sk", WINDOW).try_collect().await;

        assert!(matches!(result, Err(ExportError::Fetch { status: 500, .. })));
    }

    #[test]
    fn test_client_trims_base_url() {
        let config = ExportConfig {
            api_base: "http://localhost:12111/".to_string(),
            ..ExportConfig::default()
        };
        let client = StripeClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:12111");
        assert_eq!(client.page_size, config.page_size);
    }

    #[test]
    fn test_error_body_parsing() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "Invalid API Key provided: sk_test_***"}}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        assert!(parsed.error.message.starts_with("Invalid API Key"));
    }

    /// Accepts one connection, records its request head and answers with `response`
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });

        (base_url, handle)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn client_for(base_url: &str, page_size: u32, timeout_secs: u64) -> StripeClient {
        let config = ExportConfig {
            api_base: base_url.to_string(),
            page_size,
            request_timeout_secs: timeout_secs,
            ..ExportConfig::default()
        };
        StripeClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_http_request_carries_window_cursor_and_key() {
        let body = r#"{
            "object": "list",
            "data": [{
                "id": "txn_10", "created": 100, "amount": 1000, "fee": 30,
                "description": "Invoice", "source": "ch_1", "type": "charge"
            }],
            "has_more": true
        }"#;
        let (base_url, server) = serve_once(http_response("200 OK", body)).await;
        let client = client_for(&base_url, 2, 5);

        let page = client
            .fetch_page("sk_test_x", &WINDOW, Some("txn_9"))
            .await
            .unwrap();
        assert!(page.has_more);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, "txn_10");
        assert_eq!(page.data[0].source.as_deref(), Some("ch_1"));

        let head = server.await.unwrap();
        let request_line = head.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /v1/balance_transactions?created%5Bgte%5D=0&created%5Blt%5D=86400&limit=2&starting_after=txn_9 HTTP/1.1"
        );
        assert!(head.to_lowercase().contains("authorization: bearer sk_test_x"));
    }

    #[tokio::test]
    async fn test_http_first_page_has_no_cursor() {
        let body = r#"{"object": "list", "data": [], "has_more": false}"#;
        let (base_url, server) = serve_once(http_response("200 OK", body)).await;
        let client = client_for(&base_url, 100, 5);

        let page = client.fetch_page("sk_test_x", &WINDOW, None).await.unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);

        let head = server.await.unwrap();
        assert!(!head.contains("starting_after"));
        assert!(head.contains("limit=100"));
    }

    #[tokio::test]
    async fn test_http_error_status_maps_to_fetch() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "Invalid API Key provided: sk_test_***"}}"#;
        let (base_url, _server) = serve_once(http_response("401 Unauthorized", body)).await;
        let client = client_for(&base_url, 100, 5);

        match client.fetch_page("sk_test_x", &WINDOW, None).await {
            Err(ExportError::Fetch { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API Key provided: sk_test_***");
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_without_json_body_keeps_text() {
        let (base_url, _server) =
            serve_once(http_response("503 Service Unavailable", "upstream down")).await;
        let client = client_for(&base_url, 100, 5);

        match client.fetch_page("sk_test_x", &WINDOW, None).await {
            Err(ExportError::Fetch { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream down");
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_stalled_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            drop(socket);
        });

        let client = client_for(&base_url, 100, 1);
        let result = client.fetch_page("sk_test_x", &WINDOW, None).await;
        server.abort();

        match result {
            Err(ExportError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
