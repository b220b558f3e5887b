//! SonarQube web API client.
//!
//! Only the three endpoints the analyzer needs are covered: project creation
//! and user token revoke/generate. Every request carries HTTP basic auth with
//! the configured credentials. There are no retries; a non-success status is
//! returned as [`SonarError::Status`]. It is logged as an error except for
//! token revocation, which the pipeline is allowed to ignore.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Name under which the analyzer's user token is stored on the server
pub const TOKEN_NAME: &str = "AndroidAnalyzerToken";

const PROJECTS_CREATE: &str = "/api/projects/create";
const TOKENS_REVOKE: &str = "/api/user_tokens/revoke";
const TOKENS_GENERATE: &str = "/api/user_tokens/generate";

/// Errors from the SonarQube web API
#[derive(Error, Debug)]
pub enum SonarError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Could not extract user token: {0}")]
    MalformedToken(String),
}

/// Short-lived user token; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Outcome of a project registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRegistration {
    Created,
    AlreadyExists,
}

/// Remote operations the analyzer performs against SonarQube
#[async_trait]
pub trait SonarApi: Send + Sync {
    async fn register_project(
        &self,
        key: &str,
        name: &str,
    ) -> Result<ProjectRegistration, SonarError>;

    async fn revoke_token(&self, name: &str) -> Result<(), SonarError>;

    async fn generate_token(&self, name: &str) -> Result<AuthToken, SonarError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// Pull the `token` field out of a `/api/user_tokens/generate` response body
pub fn extract_token(body: &str) -> Result<AuthToken, SonarError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| SonarError::MalformedToken(e.to_string()))?;

    match response.token {
        Some(token) if !token.is_empty() => Ok(AuthToken(token)),
        _ => Err(SonarError::MalformedToken(
            "response has no token field".to_string(),
        )),
    }
}

/// SonarQube returns 400 with this message when the project key is taken
fn is_already_exists(body: &str) -> bool {
    body.contains("already exists")
}

/// reqwest-backed [`SonarApi`]
pub struct SonarQubeClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl SonarQubeClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, SonarError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("android-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SonarError::Transport {
                endpoint: base_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    /// Build a client from a validated analyzer configuration
    pub fn from_config(config: &crate::models::AnalyzerConfig) -> Result<Self, SonarError> {
        Self::new(
            config.server_url(),
            config.sonarqube_username(),
            config.sonarqube_password(),
        )
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// POST a form and return the status and body, whatever the status is
    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, String), SonarError> {
        let url = self.endpoint_url(endpoint);
        tracing::debug!("POST {}", url);

        let transport = |e: reqwest::Error| SonarError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .form(form)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        Ok((status, body))
    }
}

fn unexpected_status(endpoint: &str, status: reqwest::StatusCode, body: String) -> SonarError {
    SonarError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn status_error(endpoint: &str, status: reqwest::StatusCode, body: String) -> SonarError {
    tracing::error!("ERROR {} from {}", status.as_u16(), endpoint);
    tracing::error!("{}", body);
    unexpected_status(endpoint, status, body)
}

#[async_trait]
impl SonarApi for SonarQubeClient {
    async fn register_project(
        &self,
        key: &str,
        name: &str,
    ) -> Result<ProjectRegistration, SonarError> {
        let (status, body) = self
            .post_form(PROJECTS_CREATE, &[("project", key), ("name", name)])
            .await?;

        if status.is_success() {
            tracing::info!("Project {} successfully created", key);
            Ok(ProjectRegistration::Created)
        } else if status == reqwest::StatusCode::BAD_REQUEST && is_already_exists(&body) {
            tracing::info!("Project {} already exists", key);
            Ok(ProjectRegistration::AlreadyExists)
        } else {
            Err(status_error(PROJECTS_CREATE, status, body))
        }
    }

    async fn revoke_token(&self, name: &str) -> Result<(), SonarError> {
        let (status, body) = self.post_form(TOKENS_REVOKE, &[("name", name)]).await?;

        if status.is_success() {
            Ok(())
        } else {
            // A missing token is the normal case on a first run
            tracing::debug!(
                "Token {} could not be revoked: HTTP {}: {}",
                name,
                status.as_u16(),
                body
            );
            Err(unexpected_status(TOKENS_REVOKE, status, body))
        }
    }

    async fn generate_token(&self, name: &str) -> Result<AuthToken, SonarError> {
        let (status, body) = self.post_form(TOKENS_GENERATE, &[("name", name)]).await?;

        if !status.is_success() {
            return Err(status_error(TOKENS_GENERATE, status, body));
        }

        let token = extract_token(&body)?;
        tracing::info!("Token successfully extracted");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Single-request HTTP server; hands back the raw request it received
    async fn serve_once(status: u16, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request_complete(&request) {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (base_url, rx)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= head_end + 4 + content_length
    }

    fn has_header(request: &str, header: &str) -> bool {
        request.lines().any(|line| line.eq_ignore_ascii_case(header))
    }

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_extract_token() {
        let body = r#"{"login":"admin","name":"AndroidAnalyzerToken","token":"squ_123abc"}"#;
        let token = extract_token(body).unwrap();
        assert_eq!(token.expose(), "squ_123abc");
    }

    #[test]
    fn test_extract_token_missing_field() {
        let err = extract_token(r#"{"login":"admin"}"#).unwrap_err();
        assert!(matches!(err, SonarError::MalformedToken(_)));

        let err = extract_token("not json").unwrap_err();
        assert!(matches!(err, SonarError::MalformedToken(_)));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::new("secret");
        assert_eq!(format!("{:?}", token), "AuthToken(***)");
    }

    #[test]
    fn test_endpoint_url_trims_trailing_slash() {
        let client = SonarQubeClient::new("http://sonar.local:9000/", "admin", "admin").unwrap();
        assert_eq!(
            client.endpoint_url(PROJECTS_CREATE),
            "http://sonar.local:9000/api/projects/create"
        );
    }

    #[test]
    fn test_already_exists_detection() {
        let body = r#"{"errors":[{"msg":"Could not create Project, key already exists: app-android"}]}"#;
        assert!(is_already_exists(body));
        assert!(!is_already_exists(r#"{"errors":[{"msg":"Insufficient privileges"}]}"#));
    }

    #[test]
    fn test_status_error_message() {
        let err = status_error(TOKENS_GENERATE, reqwest::StatusCode::UNAUTHORIZED, "nope".into());
        assert_eq!(err.to_string(), "/api/user_tokens/generate returned HTTP 401: nope");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) is not expected to run an HTTP server locally
        let client = SonarQubeClient::new("http://127.0.0.1:9", "admin", "admin").unwrap();
        let err = client.revoke_token(TOKEN_NAME).await.unwrap_err();
        assert!(matches!(err, SonarError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_register_project_sends_form_with_basic_auth() {
        let (base_url, request) =
            serve_once(200, r#"{"project":{"key":"nl.pinch.app-android","name":"App"}}"#).await;
        let client = SonarQubeClient::new(&base_url, "admin", "secret").unwrap();

        let registration = client
            .register_project("nl.pinch.app-android", "App")
            .await
            .unwrap();
        assert_eq!(registration, ProjectRegistration::Created);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/projects/create HTTP/1.1\r\n"));
        // admin:secret
        assert!(has_header(&request, "authorization: Basic YWRtaW46c2VjcmV0"));
        assert!(has_header(
            &request,
            "content-type: application/x-www-form-urlencoded"
        ));
        assert!(request.ends_with("\r\n\r\nproject=nl.pinch.app-android&name=App"));
    }

    #[tokio::test]
    async fn test_register_project_existing_key_is_not_fatal() {
        let (base_url, _request) = serve_once(
            400,
            r#"{"errors":[{"msg":"Could not create Project, key already exists: nl.pinch.app-android"}]}"#,
        )
        .await;
        let client = SonarQubeClient::new(&base_url, "admin", "admin").unwrap();

        let registration = client
            .register_project("nl.pinch.app-android", "App")
            .await
            .unwrap();
        assert_eq!(registration, ProjectRegistration::AlreadyExists);
    }

    #[tokio::test]
    async fn test_register_project_other_bad_request_is_fatal() {
        let (base_url, _request) =
            serve_once(400, r#"{"errors":[{"msg":"Malformed key for Project"}]}"#).await;
        let client = SonarQubeClient::new(&base_url, "admin", "admin").unwrap();

        let err = client
            .register_project("nl.pinch.app-android", "App")
            .await
            .unwrap_err();
        match err {
            SonarError::Status {
                endpoint,
                status,
                body,
            } => {
                assert_eq!(endpoint, PROJECTS_CREATE);
                assert_eq!(status, 400);
                assert!(body.contains("Malformed key"));
            }
            other => panic!("expected a status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_token_reads_token_from_body() {
        let (base_url, request) = serve_once(
            200,
            r#"{"login":"admin","name":"AndroidAnalyzerToken","token":"squ_fresh"}"#,
        )
        .await;
        let client = SonarQubeClient::new(&base_url, "admin", "admin").unwrap();

        let token = client.generate_token(TOKEN_NAME).await.unwrap();
        assert_eq!(token.expose(), "squ_fresh");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/user_tokens/generate HTTP/1.1\r\n"));
        assert!(request.ends_with("\r\n\r\nname=AndroidAnalyzerToken"));
    }

    #[tokio::test]
    async fn test_generate_token_rejected_credentials_are_fatal() {
        let (base_url, _request) = serve_once(401, "").await;
        let client = SonarQubeClient::new(&base_url, "admin", "wrong").unwrap();

        let err = client.generate_token(TOKEN_NAME).await.unwrap_err();
        assert!(matches!(err, SonarError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_failed_revoke_is_not_logged_as_error() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (base_url, request) = serve_once(
            404,
            r#"{"errors":[{"msg":"User token 'AndroidAnalyzerToken' not found"}]}"#,
        )
        .await;
        let client = SonarQubeClient::new(&base_url, "admin", "admin").unwrap();

        let err = client.revoke_token(TOKEN_NAME).await.unwrap_err();
        assert!(matches!(err, SonarError::Status { status: 404, .. }));

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/user_tokens/revoke HTTP/1.1\r\n"));

        let output = logs.text();
        assert!(output.contains("could not be revoked: HTTP 404"));
        assert!(!output.contains("ERROR"));
    }
}
