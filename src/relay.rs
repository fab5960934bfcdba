use crate::config::Config;
use crate::error::RelayError;
use crate::firmware;
use crate::static_files::StaticFileHandler;
use crate::upstream::{
    FIRMWARE_STATUS_PATH, FIRMWARE_UPDATE_PATH, FIRMWARE_UPGRADE_PATH, UpstreamClient,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1::Builder as ServerBuilder;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use rustls::ServerConfig;
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// The relay's inbound HTTP server. Routes the three firmware actions to
/// the upstream client and everything else to the static asset handler.
pub struct RelayServer {
    upstream: Arc<UpstreamClient>,
    static_files: Option<Arc<StaticFileHandler>>,
}

impl RelayServer {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);

        let static_files = match &config.static_files {
            Some(static_config) => Some(Arc::new(StaticFileHandler::new(static_config.clone())?)),
            None => None,
        };

        Ok(Self { upstream, static_files })
    }

    pub async fn run_with_config(
        self,
        addr: SocketAddr,
        private_key: Option<String>,
        certificate: Option<String>,
    ) -> Result<(), RelayError> {
        match (private_key, certificate) {
            (Some(private_key_path), Some(cert_path)) => {
                let tls_config = create_tls_config(&private_key_path, &cert_path)?;
                self.run_https(addr, Arc::new(tls_config)).await
            }
            _ => self.run_http(addr).await,
        }
    }

    pub async fn run_http(self, addr: SocketAddr) -> Result<(), RelayError> {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(RelayError::Io)?;
        info!("Relay listening on: http://{}", addr);
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, _) = listener.accept().await.map_err(RelayError::Io)?;
            let upstream = self.upstream.clone();
            let static_files = self.static_files.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let upstream = upstream.clone();
                    let static_files = static_files.clone();
                    async move { Ok::<_, Infallible>(handle_request(upstream, static_files, req).await) }
                });

                if let Err(e) = ServerBuilder::new().serve_connection(io, service).await {
                    error!("Error serving HTTP connection: {}", e);
                }
            });
        }
    }

    async fn run_https(self, addr: SocketAddr, tls_config: Arc<ServerConfig>) -> Result<(), RelayError> {
        let acceptor = TlsAcceptor::from(tls_config);
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(RelayError::Io)?;
        info!("Relay listening on: https://{}", addr);

        loop {
            let (tcp_stream, remote_addr) = listener.accept().await.map_err(RelayError::Io)?;
            let acceptor = acceptor.clone();
            let upstream = self.upstream.clone();
            let static_files = self.static_files.clone();

            tokio::spawn(async move {
                match acceptor.accept(tcp_stream).await {
                    Ok(tls_stream) => {
                        let service = service_fn(move |req| {
                            let upstream = upstream.clone();
                            let static_files = static_files.clone();
                            async move {
                                Ok::<_, Infallible>(handle_request(upstream, static_files, req).await)
                            }
                        });

                        if let Err(e) = ServerBuilder::new()
                            .keep_alive(true)
                            .serve_connection(TokioIo::new(tls_stream), service)
                            .await
                        {
                            error!("Error serving TLS connection: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Error establishing TLS connection from {}: {}", remote_addr, e);
                    }
                }
            });
        }
    }
}

/// Maps a local route to the upstream firmware path and whether the
/// response body gets summarized before being returned.
fn action_for_path(path: &str) -> Option<(&'static str, bool)> {
    match path {
        "/api/status" => Some((FIRMWARE_STATUS_PATH, true)),
        "/api/update" => Some((FIRMWARE_UPDATE_PATH, false)),
        "/api/upgrade" => Some((FIRMWARE_UPGRADE_PATH, false)),
        _ => None,
    }
}

async fn handle_request(
    upstream: Arc<UpstreamClient>,
    static_files: Option<Arc<StaticFileHandler>>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if req.method() == Method::POST {
        if let Some((upstream_path, summarize)) = action_for_path(req.uri().path()) {
            // The inbound body is ignored; nothing from it reaches upstream.
            return relay_action(&upstream, upstream_path, summarize).await;
        }
    }

    match &static_files {
        Some(handler) => match handler.handle_request(&req).await {
            Ok(response) => response,
            Err(e) => {
                error!("Static file error: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        },
        None => text_response(StatusCode::NOT_FOUND, "Not Found".to_string()),
    }
}

async fn relay_action(upstream: &UpstreamClient, path: &str, summarize: bool) -> Response<Full<Bytes>> {
    let result = upstream.post(path).await.and_then(|raw| {
        if summarize {
            firmware::render_status(&raw)
        } else {
            Ok(raw)
        }
    });

    match result {
        Ok(body) => text_response(StatusCode::OK, body),
        Err(e) => {
            error!("Relay action {} failed: {}", path, e);
            error_response(&e)
        }
    }
}

/// Converts a relay failure into the plain-text diagnostic the caller
/// sees. Upstream status and body are preserved verbatim in the message.
fn error_response(error: &RelayError) -> Response<Full<Bytes>> {
    text_response(StatusCode::BAD_GATEWAY, error.to_string())
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Builds the rustls server configuration from PEM key and certificate files.
fn create_tls_config(private_key_path: &str, cert_path: &str) -> Result<ServerConfig, RelayError> {
    let mut private_key_file = BufReader::new(
        File::open(private_key_path)
            .map_err(|e| RelayError::Config(format!("Failed to open private key file: {}", e)))?,
    );

    let mut cert_file = BufReader::new(
        File::open(cert_path)
            .map_err(|e| RelayError::Config(format!("Failed to open certificate file: {}", e)))?,
    );

    let certs = rustls_pemfile::certs(&mut cert_file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Config(format!("Failed to read certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(RelayError::Config("No valid certificate found".to_string()));
    }

    let private_key = rustls_pemfile::private_key(&mut private_key_file)
        .map_err(|e| RelayError::Config(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| RelayError::Config("No valid private key found".to_string()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, private_key)
        .map_err(|e| RelayError::Config(format!("Failed to create TLS config: {}", e)))?;

    Ok(config)
}
