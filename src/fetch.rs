use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::LabelerError;
use crate::store::Workspace;

pub trait ArchiveClient: Send + Sync {
    /// Fetches `url` into `destination`. A single attempt; callers decide
    /// what a failure means for the rest of the batch.
    fn download(&self, url: &str, destination: &Path) -> Result<(), LabelerError>;
}

#[derive(Clone)]
pub struct HttpArchiveClient {
    client: Client,
}

impl HttpArchiveClient {
    pub fn new() -> Result<Self, LabelerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ipeds-labeler/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LabelerError::Http(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| LabelerError::Http(err.to_string()))?;

        Ok(Self { client })
    }
}

impl ArchiveClient for HttpArchiveClient {
    fn download(&self, url: &str, destination: &Path) -> Result<(), LabelerError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| LabelerError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .map(|body| body.chars().take(200).collect())
                .unwrap_or_else(|_| format!("request for {url} failed"));
            return Err(LabelerError::HttpStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| LabelerError::Http(err.to_string()))?;
        let destination = camino::Utf8Path::from_path(destination).ok_or_else(|| {
            LabelerError::Filesystem(format!("non-utf8 path {}", destination.display()))
        })?;
        Workspace::write_bytes_atomic(destination, &bytes)
    }
}

/// Enforces a fixed pause between any two consecutive network requests of a run,
/// counted from the end of the previous request.
#[derive(Debug)]
pub struct RequestPacer {
    pause: Duration,
    last_finished: Option<Instant>,
}

impl RequestPacer {
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            last_finished: None,
        }
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Runs `request` once the pause since the previous one has elapsed.
    pub fn run<T>(&mut self, request: impl FnOnce() -> T) -> T {
        if let Some(last) = self.last_finished {
            let elapsed = last.elapsed();
            if elapsed < self.pause {
                thread::sleep(self.pause - elapsed);
            }
        }
        let result = request();
        self.last_finished = Some(Instant::now());
        result
    }
}
