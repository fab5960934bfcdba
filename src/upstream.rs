use crate::config::UpstreamConfig;
use crate::error::RelayError;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use log::{debug, warn};
use tokio::time::{Duration, timeout};

/// Firmware API actions the relay is allowed to trigger.
pub const FIRMWARE_STATUS_PATH: &str = "/api/core/firmware/status";
pub const FIRMWARE_UPDATE_PATH: &str = "/api/core/firmware/update";
pub const FIRMWARE_UPGRADE_PATH: &str = "/api/core/firmware/upgrade";

/// HTTPS client for the appliance management API. Holds the pre-computed
/// Basic auth header and the TLS-validation policy; shared read-only across
/// inbound requests.
pub struct UpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base_url: String,
    auth_header: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, RelayError> {
        let connector = if config.insecure_tls {
            warn!("TLS certificate validation for the upstream appliance is DISABLED");
            insecure_connector()?
        } else {
            HttpsConnector::new()
        };

        let client = Client::builder(TokioExecutor::new()).build(connector);

        let credentials = format!("{}:{}", config.api_key, config.api_secret);
        let auth_header = format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Issues one authenticated POST to `{base_url}{path}` with the fixed
    /// empty JSON body and returns the raw response body as text. Non-2xx
    /// responses become an upstream error carrying the status and body
    /// verbatim; connection and timeout failures become transport errors.
    pub async fn post(&self, path: &str) -> Result<String, RelayError> {
        let uri = self.build_uri(path)?;
        debug!("POST {}", uri);

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(b"{}")))
            .map_err(|e| RelayError::Http(e.to_string()))?;

        let response = timeout(self.request_timeout, self.client.request(request))
            .await
            .map_err(|_| {
                RelayError::Transport(format!(
                    "upstream request timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            })?
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?
            .to_bytes();
        let body = String::from_utf8(body_bytes.to_vec())?;

        if !status.is_success() {
            return Err(RelayError::Upstream { status, body });
        }

        Ok(body)
    }

    fn build_uri(&self, path: &str) -> Result<Uri, RelayError> {
        format!("{}{}", self.base_url, path)
            .parse()
            .map_err(|e: http::uri::InvalidUri| RelayError::Uri(e.to_string()))
    }
}

fn insecure_connector() -> Result<HttpsConnector<HttpConnector>, RelayError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| RelayError::Config(format!("failed to build TLS connector: {}", e)))?;

    Ok(HttpsConnector::from((http, tls.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            insecure_tls: false,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_auth_header_encoding() {
        let client = UpstreamClient::new(&config("https://fw.example.com")).unwrap();
        // base64("key:secret")
        assert_eq!(client.auth_header, "Basic a2V5OnNlY3JldA==");
    }

    #[test]
    fn test_uri_building_trims_trailing_slash() {
        let client = UpstreamClient::new(&config("https://fw.example.com/")).unwrap();
        let uri = client.build_uri(FIRMWARE_STATUS_PATH).unwrap();
        assert_eq!(uri.to_string(), "https://fw.example.com/api/core/firmware/status");
    }

    #[test]
    fn test_insecure_client_creation() {
        let mut config = config("https://192.168.1.1");
        config.insecure_tls = true;
        assert!(UpstreamClient::new(&config).is_ok());
    }
}
