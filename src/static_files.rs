use crate::config::StaticFileConfig;
use crate::error::RelayError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

const HTML_404_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>404 Not Found</title></head>
<body>
    <h1>404 Not Found</h1>
    <p>The requested resource was not found on this server.</p>
</body>
</html>"#;

/// Serves the relay's web UI assets from a single root directory.
/// GET/HEAD only; requests that escape the root resolve to 404.
pub struct StaticFileHandler {
    root: PathBuf,
    index_files: Vec<String>,
    custom_mime_types: std::collections::HashMap<String, String>,
    cache_millisecs: u64,
}

impl StaticFileHandler {
    pub fn new(config: StaticFileConfig) -> Result<Self, RelayError> {
        let root = Path::new(&config.root_dir).canonicalize().map_err(|e| {
            RelayError::Config(format!("invalid static root directory '{}': {}", config.root_dir, e))
        })?;

        Ok(Self {
            root,
            index_files: config.index_files,
            custom_mime_types: config.custom_mime_types,
            cache_millisecs: config.cache_millisecs,
        })
    }

    pub async fn handle_request(&self, req: &Request<Incoming>) -> Result<Response<Full<Bytes>>, RelayError> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", "GET, HEAD")
                .body(Full::new(Bytes::new()))
                .map_err(|e| RelayError::Http(e.to_string()));
        }

        let decoded = percent_decode_str(req.uri().path()).decode_utf8_lossy();
        let file_path = match self.resolve(&decoded) {
            Some(path) => path,
            None => return Ok(self.not_found_response()),
        };

        self.serve_file(&file_path, req.method() == Method::HEAD).await
    }

    /// Maps a request path to a file under the root. Returns None for
    /// missing files and for anything that resolves outside the root.
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.trim_start_matches('/');
        let candidate = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };

        let resolved = candidate.canonicalize().ok()?;
        if !resolved.starts_with(&self.root) {
            return None;
        }

        if resolved.is_dir() {
            for index in &self.index_files {
                let index_path = resolved.join(index);
                if index_path.is_file() {
                    return Some(index_path);
                }
            }
            return None;
        }

        resolved.is_file().then_some(resolved)
    }

    async fn serve_file(&self, file_path: &Path, is_head: bool) -> Result<Response<Full<Bytes>>, RelayError> {
        let metadata = match tokio::fs::metadata(file_path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(self.not_found_response()),
        };

        let mime_type = self.guess_mime_type(file_path);
        let cache_secs = self.cache_millisecs / 1000;

        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", mime_type)
            .header("Content-Length", metadata.len().to_string())
            .header("Cache-Control", format!("public, max-age={}", cache_secs));

        if let Ok(modified) = metadata.modified() {
            response = response.header("Last-Modified", httpdate::fmt_http_date(modified));
        }

        let body = if is_head {
            Full::new(Bytes::new())
        } else {
            let contents = tokio::fs::read(file_path).await?;
            Full::new(Bytes::from(contents))
        };

        response.body(body).map_err(|e| RelayError::Http(e.to_string()))
    }

    fn guess_mime_type(&self, file_path: &Path) -> String {
        if let Some(extension) = file_path.extension().and_then(|ext| ext.to_str()) {
            if let Some(custom) = self.custom_mime_types.get(&extension.to_lowercase()) {
                return custom.clone();
            }
        }

        let mime = mime_guess::from_path(file_path).first_or_octet_stream();
        let mime_str = mime.as_ref();
        if mime_str.starts_with("text/") || mime_str == "application/json" || mime_str == "application/xml" {
            format!("{}; charset=utf-8", mime_str)
        } else {
            mime_str.to_string()
        }
    }

    fn not_found_response(&self) -> Response<Full<Bytes>> {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(Full::new(Bytes::from(HTML_404_TEMPLATE)))
            .unwrap()
    }
}
