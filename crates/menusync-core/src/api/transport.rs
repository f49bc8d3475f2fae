use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client};
use tracing::debug;

use super::TransportError;
use crate::utils::lock_unpoisoned;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a 2xx response, or the error its status maps to.
    pub fn into_body(self) -> Result<Vec<u8>, TransportError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(TransportError::from_status(self.status, &self.body))
        }
    }
}

/// Single-shot GET. Implementations must not retry.
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    token: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: None,
        })
    }

    /// A transport sharing this one's connection pool that sends `token`
    /// as a bearer credential.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            token: Some(token.into()),
        }
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        async move {
            let mut request = self
                .client
                .get(url)
                .header(header::ACCEPT, "application/json");
            if let Some(ref token) = self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            debug!(url, status, bytes = body.len(), "GET");
            Ok(HttpResponse { status, body })
        }
        .boxed()
    }
}

/// In-memory transport serving canned responses per URL. Unknown URLs get
/// a 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, Result<HttpResponse, TransportError>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        lock_unpoisoned(&self.routes).insert(url.into(), Ok(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, url: impl Into<String>, error: TransportError) {
        lock_unpoisoned(&self.routes).insert(url.into(), Err(error));
    }

    /// How many times `url` has been requested.
    pub fn hits(&self, url: &str) -> usize {
        lock_unpoisoned(&self.hits).get(url).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        lock_unpoisoned(&self.hits).values().sum()
    }
}

impl Transport for MemoryTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        *lock_unpoisoned(&self.hits).entry(url.to_string()).or_default() += 1;
        let response = lock_unpoisoned(&self.routes)
            .get(url)
            .cloned()
            .unwrap_or_else(|| Ok(HttpResponse::new(404, format!("no route for {}", url))));
        futures::future::ready(response).boxed()
    }
}
