use crate::{
    config::ShConfig,
    download::{read_cached, write_cached, DownloadClient, DownloadRequest},
    error::{Result, StatisticalError},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on a single backoff sleep, in seconds.
const MAX_SLEEP_SECONDS: f64 = 3600.0;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    expires_at: Instant,
}

impl Session {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Outcome of a single HTTP attempt that did not fail outright.
enum Attempt {
    Done(Value),
    Retry(String),
    Unauthorized(String),
}

/// Statuses worth another attempt: rate limiting and server errors.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sleep duration for a backoff of `seconds`, clamped to a sane range.
fn backoff(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.clamp(0.0, MAX_SLEEP_SECONDS)).unwrap_or_default()
}

/// Download client for Sentinel Hub processing APIs.
///
/// Authenticates with OAuth2 client credentials, retries transport errors,
/// `429` and `5xx` responses with exponential backoff, and caches responses
/// on disk when the request names a data folder.
pub struct StatisticalDownloadClient {
    client: Client,
    config: ShConfig,
    session: Mutex<Option<Session>>,
    redownload: bool,
}

impl StatisticalDownloadClient {
    pub fn new(config: ShConfig) -> Result<StatisticalDownloadClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()?;
        Ok(StatisticalDownloadClient {
            client,
            config,
            session: Mutex::new(None),
            redownload: false,
        })
    }

    /// Ignore cached responses and always hit the service.
    pub fn with_redownload(mut self, redownload: bool) -> StatisticalDownloadClient {
        self.redownload = redownload;
        self
    }

    async fn access_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref().filter(|s| s.is_valid()) {
            return Ok(current.token.clone());
        }
        if !self.config.has_credentials() {
            return Err(StatisticalError::Auth(
                "sh_client_id and sh_client_secret must be configured".to_string(),
            ));
        }

        info!("Fetching access token from {}", self.config.sh_token_url);
        let response = self
            .client
            .post(&self.config.sh_token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.sh_client_id.as_str()),
                ("client_secret", self.config.sh_client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_retryable(status) {
                return Err(StatisticalError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(StatisticalError::Auth(format!(
                "token endpoint responded with {}: {}",
                status, body
            )));
        }
        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *session = Some(Session {
            token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    async fn attempt(&self, request: &DownloadRequest) -> Result<Attempt> {
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(StatisticalError::Http(e)) => {
                return Ok(Attempt::Retry(format!("token request failed: {}", e)))
            }
            Err(StatisticalError::Status { status, body }) => {
                return Ok(Attempt::Retry(format!("token endpoint responded with {}: {}", status, body)))
            }
            Err(e) => return Err(e),
        };
        let mut builder = self
            .client
            .post(&request.url)
            .bearer_auth(token)
            .header(ACCEPT, request.data_type.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &request.post_values {
            builder = builder.json(payload);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Retry(e.to_string())),
        };
        let status = response.status();
        if status.is_success() {
            return Ok(Attempt::Done(response.json::<Value>().await?));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized(body));
        }
        if is_retryable(status) {
            return Ok(Attempt::Retry(format!("{}: {}", status, body)));
        }
        Err(StatisticalError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Value> {
        let max_tries = self.config.max_download_attempts.max(1);
        let mut sleep_secs = self.config.download_sleep_time;
        let mut last_reason = String::new();

        for attempt in 1..=max_tries {
            match self.attempt(request).await? {
                Attempt::Done(response) => return Ok(response),
                Attempt::Unauthorized(body) => {
                    warn!(
                        "Attempt {}/{}: Unauthorized for {}, refreshing token",
                        attempt, max_tries, request.url
                    );
                    self.invalidate_session().await;
                    last_reason = format!("401 Unauthorized: {}", body);
                    continue;
                }
                Attempt::Retry(reason) => {
                    warn!(
                        "Attempt {}/{}: Request to {} failed: {}",
                        attempt, max_tries, request.url, reason
                    );
                    last_reason = reason;
                }
            }

            if attempt < max_tries {
                let delay = backoff(sleep_secs);
                info!(
                    "Sleeping for {:?} before retry for {}",
                    delay, request.url
                );
                tokio::time::sleep(delay).await;
                sleep_secs *= 2.0;
            }
        }

        warn!("All attempts failed for {}", request.url);
        Err(StatisticalError::DownloadFailed {
            attempts: max_tries,
            reason: last_reason,
        })
    }
}

#[async_trait]
impl DownloadClient for StatisticalDownloadClient {
    async fn execute(&self, request: &DownloadRequest) -> Result<Value> {
        if !self.redownload {
            if let Some(cached) = read_cached(request)? {
                debug!("Using cached response for {}", request.url);
                return Ok(cached);
            }
        }

        let response = self.download(request).await?;
        if request.save_response {
            write_cached(request, &response)?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TOKEN_PATH: &str = "/oauth/token";
    const STATISTICS_PATH: &str = "/api/v1/statistics";

    /// Canned responses per path, plus the paths that were requested.
    #[derive(Default)]
    struct Responses {
        token: VecDeque<(u16, String)>,
        statistics: VecDeque<(u16, String)>,
        requested: Vec<String>,
    }

    fn token_body(token: &str) -> (u16, String) {
        (200, json!({"access_token": token, "expires_in": 3600}).to_string())
    }

    fn statistics_ok() -> (u16, String) {
        (200, json!({"data": [], "status": "OK"}).to_string())
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
        head.split_whitespace().nth(1).map(str::to_string)
    }

    /// Serve canned responses on a local port until the test ends.
    async fn serve(responses: Arc<StdMutex<Responses>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(path) = read_request(&mut socket).await else {
                    continue;
                };
                let (status, body) = {
                    let mut responses = responses.lock().unwrap();
                    responses.requested.push(path.clone());
                    let queue = if path == TOKEN_PATH {
                        &mut responses.token
                    } else {
                        &mut responses.statistics
                    };
                    queue.pop_front().unwrap_or((404, "{}".to_string()))
                };
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let reply = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", address)
    }

    async fn client_for(
        token: Vec<(u16, String)>,
        statistics: Vec<(u16, String)>,
        max_download_attempts: u32,
    ) -> (StatisticalDownloadClient, DownloadRequest, Arc<StdMutex<Responses>>) {
        let responses = Arc::new(StdMutex::new(Responses {
            token: token.into(),
            statistics: statistics.into(),
            requested: Vec::new(),
        }));
        let base_url = serve(responses.clone()).await;
        let config = ShConfig {
            sh_client_id: "id".to_string(),
            sh_client_secret: "secret".to_string(),
            sh_base_url: base_url.clone(),
            sh_token_url: format!("{}{}", base_url, TOKEN_PATH),
            max_download_attempts,
            download_sleep_time: 0.0,
            download_timeout_seconds: 10,
            ..ShConfig::default()
        };
        let request = DownloadRequest::post_json(
            format!("{}{}", base_url, STATISTICS_PATH),
            json!({"aggregation": {}}),
        );
        let mut client = StatisticalDownloadClient::new(config).unwrap();
        // keep a proxy configured in the environment away from the local server
        client.client = Client::builder().no_proxy().build().unwrap();
        (client, request, responses)
    }

    fn requested(responses: &Arc<StdMutex<Responses>>, path: &str) -> usize {
        responses
            .lock()
            .unwrap()
            .requested
            .iter()
            .filter(|requested| requested.as_str() == path)
            .count()
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_backoff_is_bounded() {
        assert_eq!(backoff(1.5), Duration::from_millis(1500));
        assert_eq!(backoff(-3.0), Duration::ZERO);
        assert_eq!(backoff(f64::NAN), Duration::ZERO);
        assert_eq!(backoff(f64::INFINITY), Duration::from_secs(3600));
        assert_eq!(backoff(f64::MAX), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (client, request, responses) = client_for(
            vec![token_body("t1")],
            vec![(500, "{}".to_string()), statistics_ok()],
            4,
        )
        .await;

        let response = client.execute(&request).await.unwrap();
        assert_eq!(response["status"], "OK");
        assert_eq!(requested(&responses, STATISTICS_PATH), 2);
        assert_eq!(requested(&responses, TOKEN_PATH), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let (client, request, responses) = client_for(
            vec![token_body("t1")],
            vec![(429, "{}".to_string()), (503, "{}".to_string()), statistics_ok()],
            4,
        )
        .await;

        assert!(client.execute(&request).await.is_ok());
        assert_eq!(requested(&responses, STATISTICS_PATH), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_token() {
        let (client, request, responses) = client_for(
            vec![token_body("t1"), token_body("t2")],
            vec![(401, "{}".to_string()), statistics_ok()],
            4,
        )
        .await;

        assert!(client.execute(&request).await.is_ok());
        assert_eq!(requested(&responses, TOKEN_PATH), 2);
        assert_eq!(client.access_token().await.unwrap(), "t2");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (client, request, responses) = client_for(
            vec![token_body("t1")],
            vec![(400, r#"{"error": "bad payload"}"#.to_string()), statistics_ok()],
            4,
        )
        .await;

        match client.execute(&request).await {
            Err(StatisticalError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("bad payload"));
            }
            other => panic!("expected a status error, got {:?}", other),
        }
        assert_eq!(requested(&responses, STATISTICS_PATH), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_attempt() {
        let (client, request, responses) = client_for(
            vec![token_body("t1")],
            vec![(503, "busy".to_string()), (503, "busy".to_string()), statistics_ok()],
            2,
        )
        .await;

        match client.execute(&request).await {
            Err(StatisticalError::DownloadFailed { attempts, reason }) => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("busy"));
            }
            other => panic!("expected a failed download, got {:?}", other),
        }
        assert_eq!(requested(&responses, STATISTICS_PATH), 2);
    }

    #[tokio::test]
    async fn test_token_endpoint_error_is_retried() {
        let (client, request, responses) = client_for(
            vec![(502, "{}".to_string()), token_body("t1")],
            vec![statistics_ok()],
            3,
        )
        .await;

        assert!(client.execute(&request).await.is_ok());
        assert_eq!(requested(&responses, TOKEN_PATH), 2);
        assert_eq!(requested(&responses, STATISTICS_PATH), 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_immediately() {
        let (client, request, responses) = client_for(
            vec![(401, r#"{"error": "invalid_client"}"#.to_string())],
            vec![statistics_ok()],
            3,
        )
        .await;

        assert!(matches!(
            client.execute(&request).await,
            Err(StatisticalError::Auth(_))
        ));
        assert_eq!(requested(&responses, TOKEN_PATH), 1);
        assert_eq!(requested(&responses, STATISTICS_PATH), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let client = StatisticalDownloadClient::new(ShConfig::default()).unwrap();
        let result = client.access_token().await;
        assert!(matches!(result, Err(StatisticalError::Auth(_))));
    }

    #[tokio::test]
    async fn test_cached_response_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = DownloadRequest::post_json(
            "https://services.sentinel-hub.com/api/v1/statistics".to_string(),
            json!({"aggregation": {}}),
        );
        request.data_folder = Some(dir.path().to_path_buf());
        let cached = json!({"data": [], "status": "OK"});
        write_cached(&request, &cached).unwrap();

        // no credentials: any network attempt would fail with an auth error
        let client = StatisticalDownloadClient::new(ShConfig::default()).unwrap();
        assert_eq!(client.execute(&request).await.unwrap(), cached);

        let client = client.with_redownload(true);
        assert!(matches!(
            client.execute(&request).await,
            Err(StatisticalError::Auth(_))
        ));
    }

    #[test]
    fn test_session_validity() {
        let fresh = Session {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(fresh.is_valid());
        let stale = Session {
            token: "t".to_string(),
            expires_at: Instant::now(),
        };
        assert!(!stale.is_valid());
    }
}
